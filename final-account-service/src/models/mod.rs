//! Data model for final-account-service.

mod bill;
mod final_account;
mod history;
mod item;
mod review;
mod section;

pub use bill::{Bill, CreateBill, UpdateBill};
pub use final_account::{CreateFinalAccount, FinalAccount, UpdateFinalAccount};
pub use history::ItemHistoryEntry;
pub use item::{CreateLineItem, LineItem, UpdateLineItem};
pub use review::{CreateSectionReview, ReviewRequestStatus, SectionReview};
pub use section::{CreateSection, Section, SectionReviewStatus, UpdateSection};
