pub mod blend;
pub mod offline;
pub mod online;
pub mod providers;
pub mod recommendations;
pub mod stats;

pub use offline::OfflineStore;
pub use online::OnlineAssembler;
pub use recommendations::Recommender;
pub use stats::ServiceStats;
