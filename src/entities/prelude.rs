pub use super::game_stats::Entity as GameStats;
pub use super::users::Entity as Users;
