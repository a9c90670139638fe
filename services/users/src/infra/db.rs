use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, IntoActiveModel as _, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr, TransactionError, TransactionTrait, sea_query::Expr,
};

use tradedesk_domain::outbox::OutboxStatus;
use tradedesk_domain::pagination::PageRequest;
use tradedesk_domain::verification::VerificationPurpose;
use tradedesk_users_schema::{login_credentials, outbox_events, users, verification_tokens};

use crate::domain::repository::{OutboxStore, UserRepository, VerificationStore};
use crate::domain::types::{
    LoginCredentials, NewOutboxEvent, NewUser, NewVerificationToken, OutboxEvent, ProfileUpdate,
    User, VerificationToken,
};
use crate::error::UsersServiceError;

// ── Error mapping ────────────────────────────────────────────────────────────

fn db_error(err: DbErr, context: &'static str) -> UsersServiceError {
    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
        return UsersServiceError::UserAlreadyExists;
    }
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
            UsersServiceError::StorageUnavailable(anyhow::Error::new(err).context(context))
        }
        other => UsersServiceError::Internal(anyhow::Error::new(other).context(context)),
    }
}

fn txn_error(
    err: TransactionError<UsersServiceError>,
    context: &'static str,
) -> UsersServiceError {
    match err {
        TransactionError::Connection(e) => db_error(e, context),
        TransactionError::Transaction(e) => e,
    }
}

trait DbResultExt<T> {
    fn db_context(self, context: &'static str) -> Result<T, UsersServiceError>;
}

impl<T> DbResultExt<T> for Result<T, DbErr> {
    fn db_context(self, context: &'static str) -> Result<T, UsersServiceError> {
        self.map_err(|e| db_error(e, context))
    }
}

// ── Postgres store ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbStore {
    pub db: DatabaseConnection,
}

impl DbStore {
    pub async fn ping(&self) -> Result<(), UsersServiceError> {
        self.db.ping().await.db_context("ping database")
    }
}

impl UserRepository for DbStore {
    async fn get_user(&self, username: &str) -> Result<Option<User>, UsersServiceError> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await
            .db_context("find user by username")?;
        Ok(model.map(user_from_model))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UsersServiceError> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await
            .db_context("find user by email")?;
        Ok(model.map(user_from_model))
    }

    async fn get_credentials(
        &self,
        user_id: i64,
    ) -> Result<Option<LoginCredentials>, UsersServiceError> {
        let model = login_credentials::Entity::find_by_id(user_id)
            .one(&self.db)
            .await
            .db_context("find login credentials")?;
        Ok(model.map(|m| LoginCredentials {
            user_id: m.user_id,
            password_hash: m.password_hash,
        }))
    }

    async fn list_users(&self, page: PageRequest) -> Result<(Vec<User>, u64), UsersServiceError> {
        let total = users::Entity::find()
            .count(&self.db)
            .await
            .db_context("count users")?;
        let models = users::Entity::find()
            .order_by_asc(users::Column::Username)
            .offset(page.offset())
            .limit(u64::from(page.page_size))
            .all(&self.db)
            .await
            .db_context("list users")?;
        Ok((models.into_iter().map(user_from_model).collect(), total))
    }

    async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<User, UsersServiceError> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await
            .db_context("find user for update")?
            .ok_or(UsersServiceError::UserNotFound)?;

        let mut am = model.into_active_model();
        am.email = Set(update.email.clone());
        am.name = Set(update.name.clone());
        am.document_id = Set(update.document_id.clone());
        am.birthday = Set(update.birthday);
        am.gender = Set(update.gender);
        am.permanent_address = Set(update.permanent_address.clone());
        am.phone_number = Set(update.phone_number.clone());
        am.updated_at = Set(Utc::now());
        let model = am.update(&self.db).await.db_context("update profile")?;
        Ok(user_from_model(model))
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), UsersServiceError> {
        let result = login_credentials::Entity::update_many()
            .col_expr(
                login_credentials::Column::PasswordHash,
                Expr::value(password_hash),
            )
            .col_expr(login_credentials::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(login_credentials::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .db_context("update password")?;
        if result.rows_affected == 0 {
            return Err(UsersServiceError::UserNotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<(), UsersServiceError> {
        let result = users::Entity::delete_many()
            .filter(users::Column::Username.eq(username))
            .exec(&self.db)
            .await
            .db_context("delete user")?;
        if result.rows_affected == 0 {
            return Err(UsersServiceError::UserNotFound);
        }
        Ok(())
    }
}

impl VerificationStore for DbStore {
    async fn create_with_verification(
        &self,
        user: &NewUser,
        password_hash: &str,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<User, UsersServiceError> {
        let user = user.clone();
        let password_hash = password_hash.to_owned();
        let token = token.clone();
        let event = event.clone();
        self.db
            .transaction::<_, User, UsersServiceError>(|txn| {
                Box::pin(async move {
                    let now = token.issued_at;
                    let model = users::ActiveModel {
                        username: Set(user.username),
                        email: Set(user.email),
                        name: Set(user.name),
                        document_id: Set(user.document_id),
                        birthday: Set(user.birthday),
                        gender: Set(user.gender),
                        permanent_address: Set(user.permanent_address),
                        phone_number: Set(user.phone_number),
                        verified: Set(false),
                        verified_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .db_context("insert user")?;

                    login_credentials::ActiveModel {
                        user_id: Set(model.id),
                        password_hash: Set(password_hash),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await
                    .db_context("insert login credentials")?;

                    insert_token(txn, model.id, &token).await?;
                    insert_outbox_event(txn, model.id, &event, now).await?;
                    Ok(user_from_model(model))
                })
            })
            .await
            .map_err(|e| txn_error(e, "create user with verification"))
    }

    async fn rotate_verification_token(
        &self,
        user_id: i64,
        token: &NewVerificationToken,
        event: &NewOutboxEvent,
    ) -> Result<(), UsersServiceError> {
        let token = token.clone();
        let event = event.clone();
        self.db
            .transaction::<_, (), UsersServiceError>(|txn| {
                Box::pin(async move {
                    let now = token.issued_at;
                    users::Entity::find_by_id(user_id)
                        .one(txn)
                        .await
                        .db_context("find user for rotation")?
                        .ok_or(UsersServiceError::UserNotFound)?;

                    verification_tokens::Entity::update_many()
                        .col_expr(verification_tokens::Column::ConsumedAt, Expr::value(now))
                        .col_expr(verification_tokens::Column::UpdatedAt, Expr::value(now))
                        .filter(verification_tokens::Column::UserId.eq(user_id))
                        .filter(verification_tokens::Column::ConsumedAt.is_null())
                        .filter(verification_tokens::Column::ExpiresAt.gt(now))
                        .exec(txn)
                        .await
                        .db_context("consume active tokens")?;

                    insert_token(txn, user_id, &token).await?;
                    insert_outbox_event(txn, user_id, &event, now).await?;
                    Ok(())
                })
            })
            .await
            .map_err(|e| txn_error(e, "rotate verification token"))
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<(VerificationToken, User)>, UsersServiceError> {
        let found = verification_tokens::Entity::find()
            .filter(verification_tokens::Column::Token.eq(token))
            .find_also_related(users::Entity)
            .one(&self.db)
            .await
            .db_context("find verification token")?;
        match found {
            Some((token, Some(user))) => {
                Ok(Some((token_from_model(token)?, user_from_model(user))))
            }
            _ => Ok(None),
        }
    }

    async fn get_latest_verification_token(
        &self,
        user_id: i64,
    ) -> Result<Option<VerificationToken>, UsersServiceError> {
        let model = verification_tokens::Entity::find()
            .filter(verification_tokens::Column::UserId.eq(user_id))
            .order_by_desc(verification_tokens::Column::CreatedAt)
            .order_by_desc(verification_tokens::Column::Id)
            .one(&self.db)
            .await
            .db_context("find latest verification token")?;
        model.map(token_from_model).transpose()
    }

    async fn verify_with_token(
        &self,
        token_id: i64,
        user_id: i64,
        verified_at: DateTime<Utc>,
    ) -> Result<User, UsersServiceError> {
        self.db
            .transaction::<_, User, UsersServiceError>(|txn| {
                Box::pin(async move {
                    let consumed = verification_tokens::Entity::update_many()
                        .col_expr(
                            verification_tokens::Column::ConsumedAt,
                            Expr::value(verified_at),
                        )
                        .col_expr(
                            verification_tokens::Column::UpdatedAt,
                            Expr::value(verified_at),
                        )
                        .filter(verification_tokens::Column::Id.eq(token_id))
                        .filter(verification_tokens::Column::ConsumedAt.is_null())
                        .exec(txn)
                        .await
                        .db_context("consume verification token")?;
                    if consumed.rows_affected == 0 {
                        return Err(UsersServiceError::TokenAlreadyUsed);
                    }

                    let mut am = users::Entity::find_by_id(user_id)
                        .one(txn)
                        .await
                        .db_context("find user for verify")?
                        .ok_or(UsersServiceError::UserNotFound)?
                        .into_active_model();
                    am.verified = Set(true);
                    am.verified_at = Set(Some(verified_at));
                    am.updated_at = Set(verified_at);
                    let model = am.update(txn).await.db_context("mark user verified")?;
                    Ok(user_from_model(model))
                })
            })
            .await
            .map_err(|e| txn_error(e, "verify with token"))
    }
}

impl OutboxStore for DbStore {
    async fn find_outbox_event(&self, id: i64) -> Result<Option<OutboxEvent>, UsersServiceError> {
        let model = outbox_events::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .db_context("find outbox event")?;
        model.map(outbox_from_model).transpose()
    }

    async fn update_outbox_status(
        &self,
        id: i64,
        status: OutboxStatus,
    ) -> Result<bool, UsersServiceError> {
        let now = Utc::now();
        let mut update = outbox_events::Entity::update_many()
            .col_expr(outbox_events::Column::Status, Expr::value(status.as_str()))
            .col_expr(outbox_events::Column::UpdatedAt, Expr::value(now));
        if status == OutboxStatus::Processed {
            update = update.col_expr(outbox_events::Column::ProcessedAt, Expr::value(now));
        }
        let result = update
            .filter(outbox_events::Column::Id.eq(id))
            .filter(outbox_events::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .db_context("update outbox status")?;
        if result.rows_affected > 0 {
            return Ok(true);
        }
        match self.find_outbox_event(id).await? {
            Some(_) => Ok(false),
            None => Err(UsersServiceError::OutboxEventNotFound),
        }
    }
}

async fn insert_token(
    txn: &DatabaseTransaction,
    user_id: i64,
    token: &NewVerificationToken,
) -> Result<(), UsersServiceError> {
    verification_tokens::ActiveModel {
        user_id: Set(user_id),
        token: Set(token.token.clone()),
        purpose: Set(token.purpose.as_str().to_owned()),
        expires_at: Set(token.expires_at),
        consumed_at: Set(None),
        created_at: Set(token.issued_at),
        updated_at: Set(token.issued_at),
        ..Default::default()
    }
    .insert(txn)
    .await
    .db_context("insert verification token")?;
    Ok(())
}

async fn insert_outbox_event(
    txn: &DatabaseTransaction,
    aggregate_id: i64,
    event: &NewOutboxEvent,
    now: DateTime<Utc>,
) -> Result<(), UsersServiceError> {
    outbox_events::ActiveModel {
        aggregate_id: Set(aggregate_id),
        aggregate_type: Set(event.aggregate_type.to_owned()),
        event_type: Set(event.event_type.to_owned()),
        payload: Set(event.payload.clone()),
        status: Set(OutboxStatus::Pending.as_str().to_owned()),
        created_at: Set(now),
        updated_at: Set(now),
        processed_at: Set(None),
        ..Default::default()
    }
    .insert(txn)
    .await
    .db_context("insert outbox event")?;
    Ok(())
}

fn user_from_model(model: users::Model) -> User {
    User {
        id: model.id,
        username: model.username,
        email: model.email,
        name: model.name,
        document_id: model.document_id,
        birthday: model.birthday,
        gender: model.gender,
        permanent_address: model.permanent_address,
        phone_number: model.phone_number,
        verified: model.verified,
        verified_at: model.verified_at,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn token_from_model(
    model: verification_tokens::Model,
) -> Result<VerificationToken, UsersServiceError> {
    let purpose = model
        .purpose
        .parse::<VerificationPurpose>()
        .context("decode verification token purpose")?;
    Ok(VerificationToken {
        id: model.id,
        user_id: model.user_id,
        token: model.token,
        purpose,
        expires_at: model.expires_at,
        consumed_at: model.consumed_at,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn outbox_from_model(model: outbox_events::Model) -> Result<OutboxEvent, UsersServiceError> {
    let status = model
        .status
        .parse::<OutboxStatus>()
        .context("decode outbox status")?;
    Ok(OutboxEvent {
        id: model.id,
        aggregate_id: model.aggregate_id,
        aggregate_type: model.aggregate_type,
        event_type: model.event_type,
        payload: model.payload,
        status,
        created_at: model.created_at,
        updated_at: model.updated_at,
        processed_at: model.processed_at,
    })
}
