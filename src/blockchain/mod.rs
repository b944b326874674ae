pub mod bitcoin;
pub mod ethereum;
pub mod traits;

pub use traits::TransactionBroadcaster;
