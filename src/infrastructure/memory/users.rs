use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::MemoryStore;
use crate::domain::{User, UserRepository};
use crate::shared::error::AppError;

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read();
        Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.to_lowercase();
        let tables = self.tables.read();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let mut tables = self.tables.write();
        let taken = tables
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken || tables.users.contains_key(&user.id) {
            return Err(AppError::Conflict(
                "User with this email or username already exists".into(),
            ));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn bind_connection(
        &self,
        id: i64,
        connection_id: &str,
    ) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.write();
        Ok(tables.users.get_mut(&id).map(|user| {
            user.bind_connection(connection_id);
            user.clone()
        }))
    }

    async fn release_connection(
        &self,
        id: i64,
        connection_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write();
        Ok(tables
            .users
            .get_mut(&id)
            .is_some_and(|user| user.release_connection(connection_id, at)))
    }

    async fn find_online(&self, limit: i64) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read();
        let mut online: Vec<User> = tables.users.values().filter(|u| u.is_online).cloned().collect();
        online.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(super::paginate(online, limit, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::error::ErrorKind;

    #[tokio::test]
    async fn test_create_rejects_duplicate_username_and_email() {
        let store = MemoryStore::new();
        let repo: &dyn UserRepository = &store;
        repo.create(&User::new(1, "alice", "alice@example.com")).await.unwrap();

        let dup_name = repo.create(&User::new(2, "alice", "other@example.com")).await;
        assert_eq!(dup_name.unwrap_err().kind(), ErrorKind::Conflict);

        let dup_email = repo.create(&User::new(3, "bob", "ALICE@example.com")).await;
        assert_eq!(dup_email.unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_release_requires_matching_connection() {
        let store = MemoryStore::new();
        let repo: &dyn UserRepository = &store;
        repo.create(&User::new(1, "alice", "alice@example.com")).await.unwrap();

        repo.bind_connection(1, "a").await.unwrap();
        repo.bind_connection(1, "b").await.unwrap();
        assert!(!repo.release_connection(1, "a", Utc::now()).await.unwrap());
        assert_eq!(repo.find_online(10).await.unwrap().len(), 1);

        assert!(repo.release_connection(1, "b", Utc::now()).await.unwrap());
        assert!(repo.find_online(10).await.unwrap().is_empty());
    }
}
