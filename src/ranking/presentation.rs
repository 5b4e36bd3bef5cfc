use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::models::Article;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// How much summary text an article gets, decided by its rank alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Long,
    Short,
    Link,
}

impl Tier {
    pub fn css_class(self) -> &'static str {
        match self {
            Tier::Long => "long-item",
            Tier::Short => "short-item",
            Tier::Link => "link-item",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentationPolicy {
    /// Below this many articles the list is ordered by interest alone.
    pub minimum_item_count: usize,
    pub recency_boost: f64,
    pub recent_window_days: f64,
    pub long_count: usize,
    pub short_count: usize,
}

impl PresentationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            minimum_item_count: config.minimum_item_count,
            recency_boost: config.recency_boost,
            recent_window_days: config.recent_window_days,
            long_count: config.long_article_count,
            short_count: config.short_article_count,
        }
    }
}

/// Display order for `articles`. Recently saved articles get a temporary
/// boost once the list is long enough; stored scores are left alone.
pub fn display_order(
    mut articles: Vec<Article>,
    policy: &PresentationPolicy,
    now: DateTime<Utc>,
) -> Vec<Article> {
    if articles.len() < policy.minimum_item_count {
        super::sort_by_interest(&mut articles);
        return articles;
    }

    let boosted = |article: &Article| {
        let days_old = (now - article.saved_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
        if days_old <= policy.recent_window_days {
            article.interest_score + policy.recency_boost
        } else {
            article.interest_score
        }
    };

    articles.sort_by(|a, b| {
        boosted(b)
            .total_cmp(&boosted(a))
            .then_with(|| b.saved_at.cmp(&a.saved_at))
    });
    articles
}

pub fn tier_for(index: usize, long_count: usize, short_count: usize) -> Tier {
    if index < long_count {
        Tier::Long
    } else if index < long_count.saturating_add(short_count) {
        Tier::Short
    } else {
        Tier::Link
    }
}

pub fn tiered<'a>(
    articles: &'a [Article],
    long_count: usize,
    short_count: usize,
) -> Vec<(Tier, &'a Article)> {
    articles
        .iter()
        .enumerate()
        .map(|(i, article)| (tier_for(i, long_count, short_count), article))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::article_saved;
    use chrono::Duration;

    fn policy(minimum_item_count: usize) -> PresentationPolicy {
        PresentationPolicy {
            minimum_item_count,
            recency_boost: 1000.0,
            recent_window_days: 7.0,
            long_count: 2,
            short_count: 3,
        }
    }

    fn ids(articles: &[Article]) -> Vec<i64> {
        articles.iter().map(|a| a.id).collect()
    }

    #[test]
    fn small_lists_sort_by_interest_only() {
        let now = Utc::now();
        let articles = vec![
            article_saved(1, 10.0, now - Duration::days(1)),
            article_saved(2, 90.0, now - Duration::days(30)),
        ];
        let sorted = display_order(articles, &policy(10), now);
        assert_eq!(ids(&sorted), vec![2, 1]);
    }

    #[test]
    fn recent_articles_jump_ahead_once_list_is_long_enough() {
        let now = Utc::now();
        let articles = vec![
            article_saved(1, 90.0, now - Duration::days(30)),
            article_saved(2, 10.0, now - Duration::days(2)),
            article_saved(3, 20.0, now - Duration::hours(6 * 24 + 23)),
            article_saved(4, 80.0, now - Duration::days(8)),
        ];
        let sorted = display_order(articles, &policy(3), now);
        assert_eq!(ids(&sorted), vec![3, 2, 1, 4]);
        // The boost never touches the stored value.
        assert_eq!(sorted[0].interest_score, 20.0);
    }

    #[test]
    fn equal_scores_prefer_the_newest() {
        let now = Utc::now();
        let articles = vec![
            article_saved(1, 50.0, now - Duration::days(20)),
            article_saved(2, 50.0, now - Duration::days(10)),
        ];
        let sorted = display_order(articles, &policy(1), now);
        assert_eq!(ids(&sorted), vec![2, 1]);
    }

    #[test]
    fn tiers_split_by_configured_counts() {
        let now = Utc::now();
        let articles: Vec<Article> = (0..8).map(|i| article_saved(i, 1.0, now)).collect();
        let tiers: Vec<Tier> = tiered(&articles, 2, 3).into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            tiers,
            vec![
                Tier::Long,
                Tier::Long,
                Tier::Short,
                Tier::Short,
                Tier::Short,
                Tier::Link,
                Tier::Link,
                Tier::Link,
            ]
        );
    }

    #[test]
    fn short_lists_degrade_gracefully() {
        let now = Utc::now();
        let articles: Vec<Article> = (0..3).map(|i| article_saved(i, 1.0, now)).collect();
        let tiers: Vec<Tier> = tiered(&articles, 2, 3).into_iter().map(|(t, _)| t).collect();
        assert_eq!(tiers, vec![Tier::Long, Tier::Long, Tier::Short]);
        assert!(tiered(&[], 2, 3).is_empty());
        assert_eq!(tier_for(0, 0, 0), Tier::Link);
    }
}
