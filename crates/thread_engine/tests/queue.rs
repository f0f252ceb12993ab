use std::sync::Arc;
use std::time::Duration;

use thread_core::{Cursor, ItemId, Job};
use thread_engine::{JobQueue, QueueShutdownError};
use tokio::time::timeout;

fn job(parent: &str, cursor: &str) -> Job {
    Job::new(ItemId::from(parent), Cursor::from(cursor))
}

#[tokio::test]
async fn jobs_come_out_in_submission_order() {
    let queue = JobQueue::new();
    queue.submit(job("A", "a1")).unwrap();
    queue.submit(job("B", "b1")).unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.outstanding(), 2);

    assert_eq!(queue.take().await, Some(job("A", "a1")));
    assert_eq!(queue.take().await, Some(job("B", "b1")));
    assert!(queue.is_empty());

    // Taken but unfinished jobs still count.
    assert_eq!(queue.outstanding(), 2);
    queue.complete();
    queue.complete();
    assert!(queue.is_idle());

    let stats = queue.stats();
    assert_eq!(stats.submitted(), 2);
    assert_eq!(stats.taken(), 2);
    assert_eq!(stats.completed(), 2);
}

#[tokio::test]
async fn wait_idle_returns_at_once_on_fresh_queue() {
    let queue = JobQueue::new();
    timeout(Duration::from_millis(100), queue.wait_idle())
        .await
        .expect("empty queue is idle");
}

#[tokio::test]
async fn wait_idle_blocks_while_a_job_is_executing() {
    let queue = Arc::new(JobQueue::new());
    queue.submit(job("A", "a1")).unwrap();
    let taken = queue.take().await;
    assert!(taken.is_some());
    assert!(queue.is_empty());

    assert!(
        timeout(Duration::from_millis(50), queue.wait_idle())
            .await
            .is_err(),
        "queue is empty but a job is still being handled"
    );

    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.wait_idle().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.complete();
    timeout(Duration::from_secs(1), waiter)
        .await
        .expect("idle after completion")
        .unwrap();
}

#[tokio::test]
async fn continuation_submitted_before_completion_keeps_queue_busy() {
    let queue = JobQueue::new();
    queue.submit(job("A", "a1")).unwrap();
    let first = queue.take().await.unwrap();
    {
        let _done = queue.completion();
        queue.submit(first.continuation(Cursor::from("a2"))).unwrap();
    }
    assert!(!queue.is_idle());
    assert_eq!(queue.take().await, Some(job("A", "a2")));
    queue.complete();
    assert!(queue.is_idle());
}

#[tokio::test]
async fn extra_completion_does_not_underflow() {
    engine_logging::initialize_for_tests();
    let queue = JobQueue::new();
    queue.complete();
    assert_eq!(queue.outstanding(), 0);
    assert_eq!(queue.stats().completed(), 0);
}

#[tokio::test]
async fn shutdown_releases_waiting_takers() {
    let queue = Arc::new(JobQueue::new());
    let takers: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;

    queue.shutdown();
    for taker in takers {
        let taken = timeout(Duration::from_secs(1), taker)
            .await
            .expect("taker released")
            .unwrap();
        assert_eq!(taken, None);
    }
    assert!(queue.is_shut_down());
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let queue = JobQueue::new();
    queue.shutdown();
    let err = queue.submit(job("A", "a1")).unwrap_err();
    assert_eq!(err, QueueShutdownError(job("A", "a1")));
    assert_eq!(queue.outstanding(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_submitted_job_is_taken_exactly_once() {
    let queue = Arc::new(JobQueue::new());
    let takers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = queue.take().await {
                    seen.push(job.cursor.as_str().to_string());
                    queue.complete();
                }
                seen
            })
        })
        .collect();

    for n in 0..200 {
        queue.submit(job("A", &format!("c{n}"))).unwrap();
    }
    timeout(Duration::from_secs(5), queue.wait_idle())
        .await
        .expect("all jobs handled");
    queue.shutdown();

    let mut all = Vec::new();
    for taker in takers {
        all.extend(taker.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 200);
    assert_eq!(queue.stats().completed(), 200);
}
