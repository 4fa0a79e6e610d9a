pub mod fulfillment;
pub mod store;
pub mod waitlist;

pub use fulfillment::WaitlistFulfillmentEngine;
pub use store::WaitlistStore;
pub use waitlist::WaitlistService;
