use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use thread_core::{Author, ChildItemData, Cursor, ItemContent, ItemId, Page, TopLevelItemData};

use crate::FetchError;

/// Which body layout the remote source speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Json,
    HtmlFragment,
}

impl WireFormat {
    pub fn decoder(self, like_count_baseline: u64) -> Arc<dyn PageDecoder> {
        match self {
            WireFormat::Json => Arc::new(JsonPageDecoder {
                like_count_baseline,
            }),
            WireFormat::HtmlFragment => Arc::new(HtmlFragmentDecoder {
                like_count_baseline,
            }),
        }
    }
}

/// Turns a decoded response body into a page of items.
pub trait PageDecoder: Send + Sync {
    fn decode_top_level(&self, body: &str) -> Result<Page<TopLevelItemData>, FetchError>;
    fn decode_child(&self, body: &str) -> Result<Page<ChildItemData>, FetchError>;
}

/// Some source sites render every like counter with an implicit +1; the
/// baseline is subtracted from each decoded counter.
fn normalize_like_count(raw: u64, baseline: u64) -> u64 {
    raw.saturating_sub(baseline)
}

/// Structured JSON pages: `{ "items": [...], "next_cursor": "..." | null }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPageDecoder {
    pub like_count_baseline: u64,
}

#[derive(Debug, Deserialize)]
struct WirePage {
    items: Vec<WireItem>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    #[serde(default)]
    author: WireAuthor,
    #[serde(default)]
    text: String,
    #[serde(default)]
    published: String,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    is_hearted: bool,
    #[serde(default)]
    reply_cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireAuthor {
    id: String,
    name: String,
    avatar_url: String,
}

impl JsonPageDecoder {
    fn page(&self, body: &str) -> Result<WirePage, FetchError> {
        serde_json::from_str(body).map_err(|err| FetchError::parse(err.to_string()))
    }

    fn content(&self, item: &mut WireItem) -> ItemContent {
        let author = std::mem::take(&mut item.author);
        ItemContent {
            author: Author {
                id: author.id,
                name: author.name,
                avatar_url: author.avatar_url,
            },
            text: std::mem::take(&mut item.text),
            published: std::mem::take(&mut item.published),
            like_count: normalize_like_count(item.like_count, self.like_count_baseline),
            is_hearted: item.is_hearted,
        }
    }
}

impl PageDecoder for JsonPageDecoder {
    fn decode_top_level(&self, body: &str) -> Result<Page<TopLevelItemData>, FetchError> {
        let page = self.page(body)?;
        let items = page
            .items
            .into_iter()
            .map(|mut item| TopLevelItemData {
                content: self.content(&mut item),
                child_cursor: non_empty_cursor(item.reply_cursor.take()),
                id: ItemId::new(item.id),
            })
            .collect();
        Ok(Page::new(items, non_empty_cursor(page.next_cursor)))
    }

    fn decode_child(&self, body: &str) -> Result<Page<ChildItemData>, FetchError> {
        let page = self.page(body)?;
        let items = page
            .items
            .into_iter()
            .map(|mut item| ChildItemData {
                content: self.content(&mut item),
                id: ItemId::new(item.id),
            })
            .collect();
        Ok(Page::new(items, non_empty_cursor(page.next_cursor)))
    }
}

fn non_empty_cursor(raw: Option<String>) -> Option<Cursor> {
    raw.filter(|token| !token.is_empty()).map(Cursor::new)
}

/// The comment-service envelope: JSON carrying rendered item markup.
///
/// Top-level bodies hold `content_html` plus `load_more_widget_html` while
/// more pages exist; reply bodies hold only `content_html`, whose trailing
/// load-more button carries the next cursor.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlFragmentDecoder {
    pub like_count_baseline: u64,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    content_html: String,
    #[serde(default)]
    load_more_widget_html: Option<String>,
}

const THREAD_SELECTOR: &str = "section.comment-thread-renderer";
const COMMENT_SELECTOR: &str = "div.comment-renderer";
const AUTHOR_SELECTOR: &str = ".comment-author-text";
const AVATAR_SELECTOR: &str = ".yt-thumb-clip img";
const TEXT_SELECTOR: &str = ".comment-renderer-text-content";
const TIME_SELECTOR: &str = ".comment-renderer-time .yt-uix-sessionlink";
const LIKES_SELECTOR: &str = ".comment-renderer-like-count";
const HEART_SELECTOR: &str = ".creator-heart";
const REPLIES_BUTTON_SELECTOR: &str = ".comment-replies-renderer .yt-uix-button";
const BUTTON_SELECTOR: &str = ".yt-uix-button";
const LOAD_MORE_ATTR: &str = "data-uix-load-more-post-body";

struct Selectors {
    thread: Selector,
    comment: Selector,
    author: Selector,
    avatar: Selector,
    text: Selector,
    time: Selector,
    likes: Selector,
    heart: Selector,
    replies_button: Selector,
    button: Selector,
}

impl Selectors {
    fn compile() -> Result<Self, FetchError> {
        Ok(Self {
            thread: selector(THREAD_SELECTOR)?,
            comment: selector(COMMENT_SELECTOR)?,
            author: selector(AUTHOR_SELECTOR)?,
            avatar: selector(AVATAR_SELECTOR)?,
            text: selector(TEXT_SELECTOR)?,
            time: selector(TIME_SELECTOR)?,
            likes: selector(LIKES_SELECTOR)?,
            heart: selector(HEART_SELECTOR)?,
            replies_button: selector(REPLIES_BUTTON_SELECTOR)?,
            button: selector(BUTTON_SELECTOR)?,
        })
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|err| FetchError::parse(format!("selector {css}: {err:?}")))
}

impl HtmlFragmentDecoder {
    fn envelope(&self, body: &str) -> Result<Envelope, FetchError> {
        serde_json::from_str(body).map_err(|err| FetchError::parse(err.to_string()))
    }

    fn comment(
        &self,
        element: ElementRef<'_>,
        selectors: &Selectors,
    ) -> Result<(ItemId, ItemContent), FetchError> {
        let id = element
            .value()
            .attr("data-cid")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FetchError::parse("comment without data-cid"))?;

        let author_link = element.select(&selectors.author).next();
        let author = Author {
            // href="/channel/<id>"
            id: author_link
                .and_then(|link| link.value().attr("href"))
                .and_then(|href| href.split('/').nth(2))
                .unwrap_or_default()
                .to_string(),
            name: author_link.map(text_of).unwrap_or_default(),
            avatar_url: element
                .select(&selectors.avatar)
                .next()
                .and_then(|img| img.value().attr("src"))
                .unwrap_or_default()
                .to_string(),
        };

        let raw_likes = element
            .select(&selectors.likes)
            .last()
            .map(text_of)
            .and_then(|likes| likes.parse::<u64>().ok())
            .unwrap_or(0);

        let content = ItemContent {
            author,
            text: element
                .select(&selectors.text)
                .next()
                .map(text_of)
                .unwrap_or_default(),
            published: element
                .select(&selectors.time)
                .next()
                .map(text_of)
                .unwrap_or_default(),
            like_count: normalize_like_count(raw_likes, self.like_count_baseline),
            is_hearted: element.select(&selectors.heart).next().is_some(),
        };
        Ok((ItemId::new(id), content))
    }
}

impl PageDecoder for HtmlFragmentDecoder {
    fn decode_top_level(&self, body: &str) -> Result<Page<TopLevelItemData>, FetchError> {
        let envelope = self.envelope(body)?;
        let selectors = Selectors::compile()?;
        let fragment = Html::parse_fragment(&envelope.content_html);

        let mut items = Vec::new();
        for thread in fragment.select(&selectors.thread) {
            let comment = thread
                .select(&selectors.comment)
                .next()
                .ok_or_else(|| FetchError::parse("thread section without a comment"))?;
            let (id, content) = self.comment(comment, &selectors)?;
            let child_cursor = thread
                .select(&selectors.replies_button)
                .next()
                .and_then(load_more_cursor);
            items.push(TopLevelItemData {
                id,
                content,
                child_cursor,
            });
        }

        let next_cursor = match envelope.load_more_widget_html {
            Some(widget) => {
                let widget = Html::parse_fragment(&widget);
                widget
                    .select(&selectors.button)
                    .next()
                    .and_then(load_more_cursor)
            }
            None => None,
        };
        Ok(Page::new(items, next_cursor))
    }

    fn decode_child(&self, body: &str) -> Result<Page<ChildItemData>, FetchError> {
        let envelope = self.envelope(body)?;
        let selectors = Selectors::compile()?;
        let fragment = Html::parse_fragment(&envelope.content_html);

        let items = fragment
            .select(&selectors.comment)
            .map(|comment| {
                self.comment(comment, &selectors)
                    .map(|(id, content)| ChildItemData { id, content })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let next_cursor = fragment
            .select(&selectors.button)
            .last()
            .and_then(load_more_cursor);
        Ok(Page::new(items, next_cursor))
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Cursor carried by a load-more button as `page_token=<escaped token>`.
fn load_more_cursor(button: ElementRef<'_>) -> Option<Cursor> {
    let body = button.value().attr(LOAD_MORE_ATTR)?;
    let (_, value) = body.split_once('=')?;
    let value = value.split('&').next().unwrap_or(value);
    let token = unquote_fully(value);
    (!token.is_empty()).then(|| Cursor::new(token))
}

/// Percent-decode until the value stops changing; tokens arrive escaped
/// more than once.
fn unquote_fully(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = percent_decode(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
