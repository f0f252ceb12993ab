use std::fmt::Write;
use std::path::{Path, PathBuf};

use thread_core::{ItemContent, ThreadId, ThreadSnapshot};

use crate::filename::snapshot_filename;
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Prefix joined with an author id to link to the author's page.
    pub author_base_url: String,
    pub avatar_size: u32,
    /// Left offset of replies, in pixels.
    pub reply_indent: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            author_base_url: "https://www.youtube.com/channel/".to_string(),
            avatar_size: 43,
            reply_indent: 43,
        }
    }
}

/// Render the whole thread as one standalone HTML document.
pub fn render_html(snapshot: &ThreadSnapshot, thread: &ThreadId, options: &RenderOptions) -> String {
    let mut html = String::new();
    let title = escape(thread.as_str());
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Comments on {title}</title></head>\n<body>\n<h2>Comments: {}</h2>\n",
        snapshot.total_count()
    );
    for item in &snapshot.items {
        push_comment(&mut html, &item.content, 0, options);
        for reply in item.children() {
            push_comment(&mut html, &reply.content, options.reply_indent, options);
        }
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn push_comment(html: &mut String, content: &ItemContent, indent: u32, options: &RenderOptions) {
    let author_url = format!("{}{}", options.author_base_url, content.author.id);
    let heart = if content.is_hearted { " &#9829;" } else { "" };
    let _ = write!(
        html,
        "<table style=\"margin-left: {indent}px;\"><tr>\
<td valign=\"top\"><img src=\"{avatar}\" height=\"{size}\" width=\"{size}\"></td>\
<td><p><a href=\"{author_url}\" target=\"_blank\"><strong>{name}</strong></a>&nbsp;{published}<br>\
{text}<br><br><em>Like counter: {likes}</em>{heart}</p></td>\
</tr></table>\n",
        avatar = escape(&content.author.avatar_url),
        size = options.avatar_size,
        author_url = escape(&author_url),
        name = escape(&content.author.name),
        published = escape(&content.published),
        text = escape(&content.text).replace('\n', "<br>"),
        likes = content.like_count,
    );
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Writes rendered threads to `{dir}/comments-{thread}.html`.
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    writer: AtomicFileWriter,
    options: RenderOptions,
}

impl HtmlRenderer {
    pub fn new(dir: &Path, options: RenderOptions) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir.to_path_buf()),
            options,
        }
    }

    pub fn write(&self, snapshot: &ThreadSnapshot, thread: &ThreadId) -> Result<PathBuf, PersistError> {
        let html = render_html(snapshot, thread, &self.options);
        self.writer.write(&snapshot_filename(thread, "html"), &html)
    }
}
