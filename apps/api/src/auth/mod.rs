// Accounts and sessions: password hashing, JWT session tokens, the bearer
// extractor guarding every user-scoped route, and the public auth endpoints.

pub mod extractor;
pub mod handlers;
pub mod password;
pub mod token;
