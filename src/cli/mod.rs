pub mod backfill;
pub mod doctor;
pub mod search;
pub mod stats;
