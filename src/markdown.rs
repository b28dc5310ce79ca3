//! Server-side markdown rendering with syntax highlighting.
//!
//! Uses comrak for CommonMark parsing and syntect for code highlighting.
//! Rendered fragments are cached to avoid re-rendering the same content.
//! `render_export_document` wraps a report in a self-contained, print-ready
//! HTML document for the download endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use comrak::plugins::syntect::SyntectAdapter;
use comrak::{Options, Plugins, markdown_to_html_with_plugins};
use once_cell::sync::Lazy;
use tokio::sync::RwLock;

// Syntect adapter for code highlighting - initialized once
static SYNTECT_ADAPTER: Lazy<SyntectAdapter> =
    Lazy::new(|| SyntectAdapter::new(Some("base16-ocean.dark")));

// Simple LRU-ish cache for rendered markdown
static RENDER_CACHE: Lazy<Arc<RwLock<MarkdownCache>>> =
    Lazy::new(|| Arc::new(RwLock::new(MarkdownCache::new(500))));

/// Print stylesheet for exported reports: A4 page, bordered tables, a
/// constrained reading column.
const EXPORT_STYLE: &str = r#"
@page {
  size: A4;
  margin: 20mm;
}

.markdown-body {
  box-sizing: border-box;
  min-width: 200px;
  max-width: 980px;
  margin: 0 auto;
  padding: 45px;
  font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif;
  line-height: 1.5;
  color: #1f2328;
}

table {
  border-collapse: collapse;
  width: 100%;
  margin: 1em 0;
}

th, td {
  border: 1px solid #ddd;
  padding: 8px;
  text-align: left;
}

th {
  background-color: #f2f2f2;
  font-weight: bold;
}

pre {
  overflow-x: auto;
  padding: 12px;
  background-color: #f6f8fa;
}
"#;

struct MarkdownCache {
    entries: HashMap<u64, (String, std::time::Instant)>,
    max_entries: usize,
}

impl MarkdownCache {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }

    fn get(&self, hash: u64) -> Option<String> {
        self.entries.get(&hash).map(|(html, _)| html.clone())
    }

    fn insert(&mut self, hash: u64, html: String) {
        // Prune the oldest quarter when full
        if self.entries.len() >= self.max_entries {
            let mut entries: Vec<_> = self
                .entries
                .iter()
                .map(|(k, (_, t))| (*k, *t))
                .collect();
            entries.sort_by(|a, b| a.1.cmp(&b.1));

            for (key, _) in entries.into_iter().take(self.max_entries / 4) {
                self.entries.remove(&key);
            }
        }

        self.entries.insert(hash, (html, std::time::Instant::now()));
    }
}

fn hash_content(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Render markdown to an HTML fragment with syntax highlighting.
///
/// Repeated calls with the same content return the cached HTML.
pub async fn render_markdown(content: &str) -> String {
    let hash = hash_content(content);

    {
        let cache = RENDER_CACHE.read().await;
        if let Some(html) = cache.get(hash) {
            return html;
        }
    }

    // Render in a blocking task (comrak/syntect are not async)
    let content_owned = content.to_string();
    let content_for_error = content.to_string();
    let html = tokio::task::spawn_blocking(move || render_markdown_sync(&content_owned))
        .await
        .unwrap_or_else(|_| format!("<pre>{}</pre>", html_escape(&content_for_error)));

    {
        let mut cache = RENDER_CACHE.write().await;
        cache.insert(hash, html.clone());
    }

    html
}

fn render_markdown_sync(content: &str) -> String {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.r#unsafe = false; // Don't allow raw HTML
    options.render.escape = true;

    let mut plugins = Plugins::default();
    plugins.render.codefence_syntax_highlighter = Some(&*SYNTECT_ADAPTER);

    markdown_to_html_with_plugins(content, &options, &plugins)
}

/// Render a report into a complete, print-ready HTML document.
///
/// Front matter is dropped from the body (it is metadata, not prose) and the
/// stylesheet is embedded so the document stands alone.
pub async fn render_export_document(title: &str, markdown: &str) -> String {
    let body = render_markdown(strip_front_matter(markdown)).await;
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body class=\"markdown-body\">\n{}\n</body>\n</html>\n",
        html_escape(title),
        EXPORT_STYLE,
        body
    )
}

/// Drop a leading `--- ... ---` front-matter block, if present.
fn strip_front_matter(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---\n") else {
        return content;
    };
    match rest.find("\n---") {
        Some(pos) => {
            let after = &rest[pos + "\n---".len()..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => content,
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
