use std::fmt;

use crate::model::Article;

/// Prefix Reader gives documents forwarded by email.
pub const EMAIL_SCHEME: &str = "mailto:";
pub const DEFAULT_NO_ARCHIVE_TAG: &str = "noarchive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmailOrigin,
    NoArchiveTag(String),
    EmptyUrl,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmailOrigin => write!(f, "email-origin document, not a web link"),
            SkipReason::NoArchiveTag(tag) => write!(f, "tagged {:?}", tag),
            SkipReason::EmptyUrl => write!(f, "empty source url"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleFilter {
    no_archive_tag: String,
}

impl Default for ArticleFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NO_ARCHIVE_TAG)
    }
}

impl ArticleFilter {
    pub fn new(no_archive_tag: impl Into<String>) -> Self {
        Self {
            no_archive_tag: no_archive_tag.into(),
        }
    }

    pub fn eligibility(&self, article: &Article) -> Result<(), SkipReason> {
        if article.source_url.starts_with(EMAIL_SCHEME) {
            return Err(SkipReason::EmailOrigin);
        }
        if article.has_tag(&self.no_archive_tag) {
            return Err(SkipReason::NoArchiveTag(self.no_archive_tag.clone()));
        }
        if article.source_url.trim().is_empty() {
            return Err(SkipReason::EmptyUrl);
        }
        Ok(())
    }

    pub fn is_eligible(&self, article: &Article) -> bool {
        self.eligibility(article).is_ok()
    }
}
