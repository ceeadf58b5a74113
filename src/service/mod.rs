pub mod eligibility;
pub mod financing;
pub mod matcher;
pub mod rate;

pub use eligibility::{eligible_rate, is_eligible};
pub use financing::FinancingService;
pub use matcher::{match_invoice, InvoiceOutcome, MatchingEngine, OfferBook};
pub use rate::{discount_amount, effective_rate};
