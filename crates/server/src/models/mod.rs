mod rows;

pub use rows::*;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}
