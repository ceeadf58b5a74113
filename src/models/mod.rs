pub mod entities;
pub mod offer;
pub mod result;
pub mod summary;

pub use entities::{Creditor, Debtor, FinancingAgreement, Invoice, Purchaser, PurchaserFinancingSettings};
pub use offer::{Offer, OfferRow};
pub use result::MatchResult;
pub use summary::{AgreementRef, BatchSummary, Finding, FindingKind};
