//! Run identity allocation.
//!
//! Authenticated runs are named `<adjective>-<noun>-<n>` where `n` is one more
//! than the number of runs already in the project. Anonymous runs share one
//! public namespace, so they get a short hash that is probed against storage
//! until a free one turns up.

use super::RemoteClient;
use crate::auth::AuthToken;
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Probes before giving up and using a widened id.
pub const MAX_PROBE_ATTEMPTS: usize = 16;

const SHORT_ID_LEN: usize = 10;
const WIDE_ID_LEN: usize = 20;

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "daring", "eager", "fuzzy", "gentle", "hollow", "icy", "jolly",
    "keen", "lucid", "mellow", "nimble", "opal", "plucky", "quiet", "rapid", "silent", "tidy",
    "upbeat", "vivid", "wild", "young", "zesty",
];

const NOUNS: &[&str] = &[
    "atom", "bond", "crystal", "dimer", "electron", "fold", "glycine", "helix", "ion", "joule",
    "kinase", "ligand", "micelle", "nucleus", "orbital", "peptide", "quark", "residue", "strand",
    "torsion", "valence", "water", "xenon", "yield", "zwitterion",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    pub run_id: String,
    pub url: String,
}

/// Pick a run id and its viewer URL. Remote failures never abort: a failed
/// listing counts as an empty project and a failed probe as a free id.
pub async fn allocate(
    client: &RemoteClient,
    project: &str,
    token: Option<&AuthToken>,
) -> RunIdentity {
    let run_id = match token {
        Some(token) if !project.is_empty() => {
            let existing = match client.count_project_files(token, project).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(project, error = %e, "could not list project files, numbering from 1");
                    0
                }
            };
            project_run_id(&mut rand::thread_rng(), existing + 1)
        }
        _ => public_run_id(client).await,
    };
    let url = client.endpoints().run_url(project, &run_id).to_string();
    RunIdentity { run_id, url }
}

fn project_run_id<R: Rng + ?Sized>(rng: &mut R, num: usize) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(rng).copied().unwrap_or("atom");
    format!("{adjective}-{noun}-{num}")
}

async fn public_run_id(client: &RemoteClient) -> String {
    let mut hasher = CandidateHasher::new();
    for attempt in 1..=MAX_PROBE_ATTEMPTS {
        let candidate = hasher.short();
        match client.run_id_taken(&candidate).await {
            Ok(false) => {
                debug!(run_id = %candidate, attempt, "run id is free");
                return candidate;
            }
            Ok(true) => {
                debug!(run_id = %candidate, attempt, "run id taken, drawing another");
                hasher.rehash();
            }
            Err(e) => {
                warn!(
                    run_id = %candidate,
                    error = %e,
                    "collision probe failed, assuming the id is free"
                );
                return candidate;
            }
        }
    }
    let wide = hasher.wide();
    warn!(
        attempts = MAX_PROBE_ATTEMPTS,
        run_id = %wide,
        "every probed run id was taken, using a wider id"
    );
    wide
}

/// sha256 over the current timestamp, redrawn with random jitter on collision.
struct CandidateHasher {
    digest: String,
}

impl CandidateHasher {
    fn new() -> Self {
        Self {
            digest: sha256_hex(&unix_seconds().to_string()),
        }
    }

    fn rehash(&mut self) {
        let jittered = unix_seconds() + rand::thread_rng().gen::<f64>();
        self.digest = sha256_hex(&jittered.to_string());
    }

    fn short(&self) -> String {
        self.digest[..SHORT_ID_LEN].to_string()
    }

    fn wide(&self) -> String {
        self.digest[..WIDE_ID_LEN].to_string()
    }
}

fn unix_seconds() -> f64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    nanos as f64 / 1e9
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_ids_are_adjective_noun_number() {
        let id = project_run_id(&mut rand::thread_rng(), 7);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NOUNS.contains(&parts[1]));
        assert_eq!(parts[2], "7");
    }

    #[test]
    fn candidates_are_lowercase_hex() {
        let mut hasher = CandidateHasher::new();
        let first = hasher.short();
        assert_eq!(first.len(), SHORT_ID_LEN);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        hasher.rehash();
        assert_ne!(hasher.short(), first);
    }

    #[test]
    fn wide_id_extends_the_short_one() {
        let hasher = CandidateHasher::new();
        assert_eq!(hasher.wide().len(), WIDE_ID_LEN);
        assert!(hasher.wide().starts_with(&hasher.short()));
    }

    #[test]
    fn word_lists_have_no_separators() {
        for word in ADJECTIVES.iter().chain(NOUNS) {
            assert!(!word.contains('-'), "{word}");
        }
    }
}
