use serde::{Deserialize, Serialize};

/// A recorded preference: `winning_id` was ranked above `losing_id` by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub id: i64,
    pub winning_id: i64,
    pub losing_id: i64,
}
