use sea_orm::entity::prelude::*;

/// User profile and verification state.
/// `verified` and `verified_at` are always written together.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    pub document_id: String,
    pub birthday: Option<chrono::DateTime<chrono::Utc>>,
    pub gender: bool,
    pub permanent_address: String,
    pub phone_number: String,
    pub verified: bool,
    pub verified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::login_credentials::Entity")]
    LoginCredentials,
    #[sea_orm(has_many = "super::verification_tokens::Entity")]
    VerificationTokens,
}

impl Related<super::login_credentials::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoginCredentials.def()
    }
}

impl Related<super::verification_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VerificationTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
