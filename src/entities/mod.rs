pub mod prelude;

pub mod game_stats;
pub mod users;
