mod article;
mod comparison;
mod summary;

pub use article::{article_id_for_url, canonical_url, Article, NewArticle};
pub use comparison::Comparison;
pub use summary::{ArticleSummary, NewsletterSummary};
