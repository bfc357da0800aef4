//! Evidencia: almacén por petición y filtros de claves.

pub mod filter;
pub mod store;

pub use filter::{EvidenceKeyFilter, EvidenceKeyFilterAggregator, EvidenceKeyFilterWhitelist};
pub use store::{split_key, Evidence, COOKIE_PREFIX, EVIDENCE_SEPARATOR, HEADER_PREFIX, QUERY_PREFIX, SERVER_PREFIX};
