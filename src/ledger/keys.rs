//! Key conventions for records held in the ledger state.

/// Prefix of every candidate record.
pub const CANDIDATE_PREFIX: &str = "CAND_";

/// Prefix of every voter record.
pub const VOTER_PREFIX: &str = "VOTER_";

/// Key of the running aggregate vote total.
pub const TOTAL_VOTES_KEY: &str = "TOTAL_VOTES";

/// Upper bound of a prefix range: the highest code point sorts after any
/// id suffix.
const RANGE_END: char = '\u{10FFFF}';

pub fn candidate_key(candidate_id: &str) -> String {
    format!("{CANDIDATE_PREFIX}{candidate_id}")
}

pub fn voter_key(voter_id: &str) -> String {
    format!("{VOTER_PREFIX}{voter_id}")
}

/// The half-open key range `[start, end)` covering every key with the given prefix.
pub fn prefix_range(prefix: &str) -> (String, String) {
    (prefix.to_string(), format!("{prefix}{RANGE_END}"))
}
