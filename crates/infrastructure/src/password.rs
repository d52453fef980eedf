use scenario_core::{SchedulerError, SchedulerResult};

/// Hash password using bcrypt
pub fn hash_password(password: &str) -> SchedulerResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| SchedulerError::Internal(format!("Failed to hash password: {e}")))
}

/// Hash password with a caller-chosen cost; tests use the minimum cost
pub fn hash_password_with_cost(password: &str, cost: u32) -> SchedulerResult<String> {
    bcrypt::hash(password, cost)
        .map_err(|e| SchedulerError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify password using bcrypt; malformed hashes never verify
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
