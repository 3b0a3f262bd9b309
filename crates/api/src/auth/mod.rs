//! Credentials and tokens: [`password`] checks a login, [`jwt`] signs and
//! validates the access token every later request presents.

pub mod jwt;
pub mod password;
