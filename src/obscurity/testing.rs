//! Test doubles shared by handler and router tests.

use super::users::{CreateOutcome, User, UserStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use uuid::Uuid;

/// A user store whose backend is always down.
pub(crate) struct UnreachableUserStore;

#[async_trait]
impl UserStore for UnreachableUserStore {
    async fn get_user_by_email(&self, _email: &str) -> Result<Option<User>> {
        Err(anyhow!("connection refused"))
    }

    async fn get_user_by_id(&self, _id: Uuid) -> Result<Option<User>> {
        Err(anyhow!("connection refused"))
    }

    async fn create_user(&self, _email: &str, _password: &SecretString) -> Result<CreateOutcome> {
        Err(anyhow!("connection refused"))
    }

    async fn verify_login(&self, _email: &str, _password: &SecretString) -> Result<Option<User>> {
        Err(anyhow!("connection refused"))
    }

    async fn ping(&self) -> Result<()> {
        Err(anyhow!("connection refused"))
    }
}

/// A user store that loses every registration race: the email looks free on
/// lookup, then the insert hits the unique constraint.
pub(crate) struct RacingUserStore;

#[async_trait]
impl UserStore for RacingUserStore {
    async fn get_user_by_email(&self, _email: &str) -> Result<Option<User>> {
        Ok(None)
    }

    async fn get_user_by_id(&self, _id: Uuid) -> Result<Option<User>> {
        Ok(None)
    }

    async fn create_user(&self, _email: &str, _password: &SecretString) -> Result<CreateOutcome> {
        Ok(CreateOutcome::Conflict)
    }

    async fn verify_login(&self, _email: &str, _password: &SecretString) -> Result<Option<User>> {
        Ok(None)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
