//! Turns the reader's drag-and-drop reorders and up/down votes into new
//! interest scores, logging the preferences each gesture implies.

mod presentation;

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{ArticleRepository, ComparisonRepository};
use crate::error::{AppError, Result};
use crate::models::{Article, NewArticle};

pub use presentation::{display_order, tiered, PresentationPolicy, Tier};

/// Score distance a vote puts between the mover and the article it passes.
pub const VOTE_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

impl FromStr for VoteDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            other => Err(AppError::Validation(format!(
                "vote direction must be 'up' or 'down', got {other:?}"
            ))),
        }
    }
}

/// Score change and comparison produced by a single vote.
#[derive(Debug, Clone, PartialEq)]
pub struct VotePlan {
    pub id: i64,
    pub new_score: f64,
    pub winning_id: i64,
    pub losing_id: i64,
}

/// Highest score first; equal scores fall back to the most recently saved.
pub fn sort_by_interest(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        b.interest_score
            .total_cmp(&a.interest_score)
            .then_with(|| b.saved_at.cmp(&a.saved_at))
    });
}

/// Works out what voting `id` one place `direction` does to `sorted`.
/// Returns `Ok(None)` when the article is already at that end of the list.
pub fn plan_vote(sorted: &[Article], id: i64, direction: VoteDirection) -> Result<Option<VotePlan>> {
    let position = sorted
        .iter()
        .position(|a| a.id == id)
        .ok_or(AppError::NotFound(id))?;

    let (neighbor_pos, beyond_pos) = match direction {
        VoteDirection::Up => {
            let Some(n) = position.checked_sub(1) else {
                return Ok(None);
            };
            (n, n.checked_sub(1))
        }
        VoteDirection::Down => {
            let n = position + 1;
            if n >= sorted.len() {
                return Ok(None);
            }
            (n, Some(n + 1).filter(|&b| b < sorted.len()))
        }
    };

    let neighbor = &sorted[neighbor_pos];
    let beyond = beyond_pos.map(|b| sorted[b].interest_score);
    let new_score = nudged_score(neighbor.interest_score, beyond, direction);

    let (winning_id, losing_id) = match direction {
        VoteDirection::Up => (id, neighbor.id),
        VoteDirection::Down => (neighbor.id, id),
    };

    Ok(Some(VotePlan {
        id,
        new_score,
        winning_id,
        losing_id,
    }))
}

/// `neighbor ± VOTE_STEP`, unless that would also pass the article on the
/// far side of the neighbor, in which case the mover lands halfway between
/// the two so it moves exactly one place.
fn nudged_score(neighbor: f64, beyond: Option<f64>, direction: VoteDirection) -> f64 {
    match direction {
        VoteDirection::Up => {
            let stepped = neighbor + VOTE_STEP;
            match beyond {
                Some(b) if b > neighbor && stepped >= b => neighbor + (b - neighbor) / 2.0,
                _ => stepped,
            }
        }
        VoteDirection::Down => {
            let stepped = neighbor - VOTE_STEP;
            match beyond {
                Some(b) if b < neighbor && stepped <= b => neighbor - (neighbor - b) / 2.0,
                _ => stepped,
            }
        }
    }
}

/// Checks a submitted order against the known ids: non-empty, no repeats,
/// nothing unknown.
pub fn validate_order(new_order: &[i64], known: &HashSet<i64>) -> Result<()> {
    if new_order.is_empty() {
        return Err(AppError::Validation("reorder needs at least one id".to_string()));
    }
    let mut seen = HashSet::with_capacity(new_order.len());
    for id in new_order {
        if !seen.insert(*id) {
            return Err(AppError::Validation(format!("article {id} appears twice")));
        }
        if !known.contains(id) {
            return Err(AppError::Validation(format!("unknown article {id}")));
        }
    }
    Ok(())
}

/// Every `(winner, loser)` pair the new order flips relative to the old
/// one: `winner` now precedes `loser` but used to follow it. Ids missing
/// from `old_order` are ignored.
pub fn inversions(old_order: &[i64], new_order: &[i64]) -> Vec<(i64, i64)> {
    let old_pos: HashMap<i64, usize> = old_order
        .iter()
        .enumerate()
        .map(|(pos, id)| (*id, pos))
        .collect();

    let mut pairs = Vec::new();
    for (i, winner) in new_order.iter().enumerate() {
        let Some(&winner_old) = old_pos.get(winner) else {
            continue;
        };
        for loser in &new_order[i + 1..] {
            if let Some(&loser_old) = old_pos.get(loser) {
                if winner_old > loser_old {
                    pairs.push((*winner, *loser));
                }
            }
        }
    }
    pairs
}

/// Dense reassignment: position `i` of an `n`-item order scores `n - i`.
pub fn dense_scores(new_order: &[i64]) -> Vec<(i64, f64)> {
    let n = new_order.len();
    new_order
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, (n - i) as f64))
        .collect()
}

/// Owns every mutation of the article store. The write lock covers each
/// read-sort-write sequence so concurrent votes cannot interleave.
pub struct RankingEngine<R> {
    repo: Arc<R>,
    writes: Mutex<()>,
}

impl<R> RankingEngine<R>
where
    R: ArticleRepository + ComparisonRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            writes: Mutex::new(()),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Current articles, highest interest first.
    pub async fn ranked(&self) -> Result<Vec<Article>> {
        let mut articles = self.repo.list_all().await?;
        sort_by_interest(&mut articles);
        Ok(articles)
    }

    /// Moves one article a single place and returns the re-sorted list.
    pub async fn vote(&self, id: i64, direction: VoteDirection) -> Result<Vec<Article>> {
        let _guard = self.writes.lock().await;

        let mut articles = self.repo.list_all().await?;
        sort_by_interest(&mut articles);

        let Some(plan) = plan_vote(&articles, id, direction)? else {
            tracing::debug!(id, ?direction, "vote at edge of list, nothing to do");
            return Ok(articles);
        };

        self.repo
            .record_ranking(
                vec![(plan.id, plan.new_score)],
                vec![(plan.winning_id, plan.losing_id)],
            )
            .await?;
        tracing::info!(
            id,
            ?direction,
            new_score = plan.new_score,
            winning_id = plan.winning_id,
            losing_id = plan.losing_id,
            "recorded vote"
        );

        if let Some(article) = articles.iter_mut().find(|a| a.id == plan.id) {
            article.interest_score = plan.new_score;
        }
        sort_by_interest(&mut articles);
        Ok(articles)
    }

    /// Applies a drag-and-drop order: logs the flipped pairs, then rescores
    /// the submitted ids densely so they read back in exactly this order.
    pub async fn reorder(&self, new_order: &[i64]) -> Result<Vec<Article>> {
        let _guard = self.writes.lock().await;

        let mut articles = self.repo.list_all().await?;
        sort_by_interest(&mut articles);

        let known: HashSet<i64> = articles.iter().map(|a| a.id).collect();
        validate_order(new_order, &known)?;

        let submitted: HashSet<i64> = new_order.iter().copied().collect();
        let old_order: Vec<i64> = articles
            .iter()
            .map(|a| a.id)
            .filter(|id| submitted.contains(id))
            .collect();

        let pairs = inversions(&old_order, new_order);
        let scores = dense_scores(new_order);

        let logged = self.repo.record_ranking(scores.clone(), pairs).await?;
        tracing::info!(items = new_order.len(), comparisons = logged, "applied reorder");

        let by_id: HashMap<i64, f64> = scores.into_iter().collect();
        for article in &mut articles {
            if let Some(score) = by_id.get(&article.id) {
                article.interest_score = *score;
            }
        }
        sort_by_interest(&mut articles);
        Ok(articles)
    }

    /// Stores a freshly summarised article under the write lock.
    pub async fn store_article(&self, article: NewArticle) -> Result<i64> {
        let _guard = self.writes.lock().await;
        self.repo.upsert(article).await
    }

    pub async fn purge_incomplete(&self) -> Result<usize> {
        let _guard = self.writes.lock().await;
        let purged = self.repo.purge_incomplete().await?;
        if purged > 0 {
            tracing::info!(purged, "removed articles without summaries");
        }
        Ok(purged)
    }
}
