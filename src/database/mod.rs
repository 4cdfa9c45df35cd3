pub mod postgres_repository;
pub mod session;
pub mod user;

use session::SessionRepository;
use user::UserRepository;

/// Storage handle managed by Rocket. Handlers borrow the per-entity views
/// and hand them to the services.
pub trait Repository: Send + Sync {
    fn sessions(&self) -> &dyn SessionRepository;
    fn users(&self) -> &dyn UserRepository;
}

impl<T> Repository for T
where
    T: SessionRepository + UserRepository,
{
    fn sessions(&self) -> &dyn SessionRepository {
        self
    }

    fn users(&self) -> &dyn UserRepository {
        self
    }
}
