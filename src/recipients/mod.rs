//! Recipient list loading and cyclic assignment

use crate::config::RecipientSourceConfig;
use crate::error::{TipperError, TipperResult};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Off-chain identity a tip is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub id_source: String,
    pub id: String,
}

impl Recipient {
    pub fn new(id_source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id_source: id_source.into(),
            id: id.into(),
        }
    }
}

/// Maps a transaction index onto the shared recipient list
#[derive(Debug, Clone)]
pub struct RecipientCycler {
    recipients: Arc<[Recipient]>,
}

impl RecipientCycler {
    pub fn new(recipients: Vec<Recipient>) -> TipperResult<Self> {
        if recipients.is_empty() {
            return Err(TipperError::NoRecipients);
        }
        Ok(Self {
            recipients: recipients.into(),
        })
    }

    /// `recipients[index mod len]`
    pub fn recipient_for(&self, index: u32) -> &Recipient {
        &self.recipients[index as usize % self.recipients.len()]
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn handles(&self) -> Vec<&str> {
        self.recipients.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Build the recipient list for a run
pub fn load_recipients(source: &RecipientSourceConfig, id_source: &str) -> Vec<Recipient> {
    let handles = match source {
        RecipientSourceConfig::File { path, fallback } => {
            load_handles_from_file(Path::new(path), fallback)
        }
        RecipientSourceConfig::Random { count } => {
            let handles = random_handles(*count, &mut rand::thread_rng());
            info!("Generated recipients: {}", handles.len());
            handles
        }
    };

    handles
        .into_iter()
        .map(|id| Recipient::new(id_source, id))
        .collect()
}

/// One handle per line, leading `@` stripped, blanks ignored.
/// An empty or unreadable file yields the fallback handle alone.
pub fn load_handles_from_file(path: &Path, fallback: &str) -> Vec<String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(
                "Failed to read recipients file {}: {}. Using default recipient {}",
                path.display(),
                e,
                fallback
            );
            return vec![fallback.to_string()];
        }
    };

    let handles: Vec<String> = contents
        .lines()
        .map(|line| line.trim())
        .map(|line| line.strip_prefix('@').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if handles.is_empty() {
        warn!("Recipients file is empty. Using default recipient {}", fallback);
        return vec![fallback.to_string()];
    }

    info!("Loaded recipients: {}", handles.len());
    handles
}

const ADJECTIVES: &[&str] = &[
    "happy", "crypto", "web3", "degen", "bullish", "bearish", "smart", "fast", "lucky",
];
const NOUNS: &[&str] = &["trader", "whale", "ape", "dev", "hodler", "builder", "gmi", "ngmi"];

/// Plausible-looking social handles: adjective + noun + 0..999
pub fn random_handles<R: Rng>(count: usize, rng: &mut R) -> Vec<String> {
    (0..count)
        .map(|_| {
            let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("lucky");
            let noun = NOUNS.choose(rng).copied().unwrap_or("ape");
            format!("{}{}{}", adjective, noun, rng.gen_range(0..1000))
        })
        .collect()
}
