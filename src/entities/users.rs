use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Case-sensitive login name; natural key for the whole account.
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    #[sea_orm(unique)]
    pub email: String,

    pub is_admin: bool,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::game_stats::Entity")]
    GameStats,
}

impl Related<super::game_stats::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GameStats.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
