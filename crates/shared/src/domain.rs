use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ArticleId);
id_newtype!(CommentId);
id_newtype!(NotificationId);
id_newtype!(ProductId);
id_newtype!(CartItemId);
id_newtype!(OrderId);
id_newtype!(AddressId);
id_newtype!(ReviewId);

/// Account role as reported by the backend. Roles this client does not know
/// about are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    Reader,
    Author,
    User,
    Seller,
    Admin,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Reader => "reader",
            Role::Author => "author",
            Role::User => "user",
            Role::Seller => "seller",
            Role::Admin => "admin",
            Role::Other(raw) => raw,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "reader" => Role::Reader,
            "author" => Role::Author,
            "user" => Role::User,
            "seller" => Role::Seller,
            "admin" => Role::Admin,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Profile fields (avatar, phone, status...) the client only passes through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id),
            username: username.into(),
            role,
            email: None,
            extra: Map::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_seller(&self) -> bool {
        self.role == Role::Seller
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credentials and identity of a logged-in user. Token and user only ever
/// exist together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_profile: Option<SellerProfile>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    auth: Option<AuthSession>,
}

impl Session {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn authenticated(auth: AuthSession) -> Self {
        Self { auth: Some(auth) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.auth.as_ref().map(|auth| auth.token.as_str())
    }

    pub fn user(&self) -> Option<&User> {
        self.auth.as_ref().map(|auth| &auth.user)
    }

    pub fn seller_profile(&self) -> Option<&SellerProfile> {
        self.auth.as_ref().and_then(|auth| auth.seller_profile.as_ref())
    }

    pub fn auth(&self) -> Option<&AuthSession> {
        self.auth.as_ref()
    }

    pub fn auth_mut(&mut self) -> Option<&mut AuthSession> {
        self.auth.as_mut()
    }

    pub fn take(&mut self) -> Option<AuthSession> {
        self.auth.take()
    }
}
