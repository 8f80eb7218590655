//! Cache key definitions.
//!
//! Every cached entry lives under one of these shapes; writers and
//! invalidators must build keys through these helpers only.

use crate::domain::interactions::Interactive;

/// Draft-side detail of an article, as its author sees it.
pub fn article_detail(id: i64) -> String {
    format!("article:detail:{id}")
}

/// Public detail of a published article.
pub fn article_public_detail(id: i64) -> String {
    format!("article:pub:detail:{id}")
}

/// First listing page of an author's articles.
pub fn article_first_page(author_id: i64) -> String {
    format!("article:first_page:{author_id}")
}

pub fn interactive(biz: &str, biz_id: i64) -> String {
    format!("interactive:article:{biz}:{biz_id}")
}

pub fn interactive_of(item: &Interactive) -> String {
    interactive(&item.biz, item.biz_id)
}

/// One-time code for `recipient` within `biz`.
pub fn code(biz: &str, recipient: &str) -> String {
    format!("phone_code:{biz}:{recipient}")
}

/// Remaining verify attempts for a code key.
pub fn code_attempts(code_key: &str) -> String {
    format!("{code_key}:cnt")
}
