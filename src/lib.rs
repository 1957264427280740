//! Privacy-preserving breached-password checks against the Pwned Passwords
//! corpus.
//!
//! A candidate password never leaves the process. Its SHA-1 digest is split
//! at the k-anonymity boundary: the first 5 hex characters (20 bits) are
//! sent to the range API, which answers with the bucket of suffixes for
//! every breached digest sharing that prefix; the 35-character suffix is
//! compared locally. A network observer learns only that one of roughly a
//! thousand buckets was of interest.
//!
//! Lookups are cached in two tiers: a bounded in-process LRU tracks recency
//! and a SQLite table keeps buckets across restarts for 24 hours. Outbound
//! requests are paced to one per second with exponential backoff on
//! throttling, and every operational failure degrades to a well-formed
//! "verdict unknown" result instead of an error.
//!
//! # Usage
//!
//! ```no_run
//! use pwncheck::{BreachChecker, CheckOptions, CheckerConfig};
//!
//! # async fn run() -> Result<(), pwncheck::Error> {
//! let checker = BreachChecker::new(CheckerConfig::default())?;
//! let result = checker.check_password("hunter2", &CheckOptions::default()).await;
//!
//! match result.breached {
//!     Some(true) => println!("breached, pick another password"),
//!     Some(false) => println!("not found in the corpus"),
//!     None => println!("could not check (offline)"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Absence of a match is evidence of likely safety, not proof: the remote
//! corpus is neither complete nor current.

pub mod checker;
pub mod client;
pub mod digest;
pub mod error;
pub mod lru;
pub mod pacer;
pub mod store;

pub use checker::{BreachChecker, BreachResult, CheckOptions, CheckerConfig};
pub use client::{DEFAULT_BASE_URL, HibpRangeClient, RangeLookup};
pub use digest::{PREFIX_LEN, PasswordDigest, SUFFIX_LEN, digest_password};
pub use error::Error;
pub use store::{CacheEntry, SuffixStore};
