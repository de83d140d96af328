// ABOUTME: Digest delivery shells: schedules, recipient rosters, delivery bookkeeping
// ABOUTME: Content assembly and dispatch live in the external scheduler, not here

pub mod manager;
pub mod storage;
pub mod types;

pub use manager::{DigestError, DigestManager, DigestResult};
pub use storage::DigestStorage;
pub use types::{
    DeliveryOutcome, DeliveryPeriod, DeliveryRecord, DeliveryStatus, Digest, DigestCreateInput,
    DigestFilter, DigestStats, DigestStatus, DigestUpdateInput, Recipient, RecipientInput,
    RecipientStatus, TimeWindow,
};
