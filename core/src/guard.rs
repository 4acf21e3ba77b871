//! Edit tokens and permission checks guarding every note write.
//!
//! A token is an HMAC-SHA256 over the caller's session, the scope it was
//! issued for and a 12-hour tick. It is accepted during the tick it was
//! issued in and the one after, for the same session and scope only.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use crate::error::{AuthorizationFailure, PostNotesError, Result};
use crate::host::{Capability, Caller};
use crate::note::ItemId;

type HmacSha256 = Hmac<Sha256>;

const TICK_SECONDS: i64 = 12 * 60 * 60;

/// What a token allows writing to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// The note of a single item (edit screen)
    Item(ItemId),
    /// Quick edit and bulk edit on the list screen
    Bulk,
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenScope::Item(id) => write!(f, "note:{}", id),
            TokenScope::Bulk => f.write_str("note:bulk"),
        }
    }
}

impl std::str::FromStr for TokenScope {
    type Err = PostNotesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.strip_prefix("note:") {
            Some("bulk") => Ok(TokenScope::Bulk),
            Some(id) => Ok(TokenScope::Item(id.parse()?)),
            None => Err(PostNotesError::Validation(format!("unknown token scope: {}", s))),
        }
    }
}

/// Progress of a write request through the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unauthenticated,
    TokenChecked,
    PermissionChecked,
    Authorized,
    Rejected(AuthorizationFailure),
}

/// Proof that a write in `scope` passed both checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteGrant {
    scope: TokenScope,
}

impl WriteGrant {
    pub fn scope(&self) -> TokenScope {
        self.scope
    }
}

/// Issues and verifies tokens for one session
#[derive(Clone)]
pub struct AccessGuard {
    mac: HmacSha256,
    session: String,
}

impl AccessGuard {
    /// Creates a guard for the given session
    pub fn new(secret: &[u8], session: &str) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| PostNotesError::Config(format!("invalid token secret: {}", e)))?;

        Ok(AccessGuard {
            mac,
            session: session.to_string(),
        })
    }

    /// Creates a guard bound to the caller's session
    pub fn for_caller(secret: &[u8], caller: &Caller) -> Result<Self> {
        Self::new(secret, &caller.session)
    }

    /// Issues a token for `scope`
    pub fn issue(&self, scope: &TokenScope) -> String {
        self.issue_at(scope, Utc::now())
    }

    pub fn issue_at(&self, scope: &TokenScope, now: DateTime<Utc>) -> String {
        hex::encode(self.signed(scope, tick(now)).finalize().into_bytes())
    }

    /// Checks a presented token against `scope`
    pub fn verify(&self, scope: &TokenScope, token: Option<&str>) -> bool {
        self.check_token_at(scope, token, Utc::now()).is_ok()
    }

    pub fn verify_at(&self, scope: &TokenScope, token: Option<&str>, now: DateTime<Utc>) -> bool {
        self.check_token_at(scope, token, now).is_ok()
    }

    /// Whether the caller may edit notes at all
    pub fn can_edit(caller: &Caller) -> bool {
        caller.has(Capability::EditPosts)
    }

    /// Runs the token check, then the permission check. Nothing may be
    /// written unless this returns a grant.
    pub fn authorize(
        &self,
        scope: &TokenScope,
        token: Option<&str>,
        caller: &Caller,
    ) -> Result<WriteGrant> {
        self.authorize_at(scope, token, caller, Utc::now())
    }

    pub fn authorize_at(
        &self,
        scope: &TokenScope,
        token: Option<&str>,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> Result<WriteGrant> {
        let mut state = GuardState::Unauthenticated;

        loop {
            state = match state {
                GuardState::Unauthenticated => {
                    let token_ok = if caller.session == self.session {
                        self.check_token_at(scope, token, now)
                    } else {
                        Err(AuthorizationFailure::InvalidToken)
                    };
                    match token_ok {
                        Ok(()) => GuardState::TokenChecked,
                        Err(failure) => GuardState::Rejected(failure),
                    }
                }
                GuardState::TokenChecked => {
                    if Self::can_edit(caller) {
                        GuardState::PermissionChecked
                    } else {
                        GuardState::Rejected(AuthorizationFailure::PermissionDenied)
                    }
                }
                GuardState::PermissionChecked => GuardState::Authorized,
                GuardState::Authorized => return Ok(WriteGrant { scope: *scope }),
                GuardState::Rejected(failure) => {
                    tracing::debug!("Rejected write for {}: {}", scope, failure);
                    return Err(PostNotesError::Authorization(failure));
                }
            };
        }
    }

    fn check_token_at(
        &self,
        scope: &TokenScope,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), AuthorizationFailure> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthorizationFailure::MissingToken),
        };

        let presented = hex::decode(token).map_err(|_| AuthorizationFailure::InvalidToken)?;
        let current = tick(now);

        let accepted = [current, current - 1]
            .into_iter()
            .any(|t| self.signed(scope, t).verify_slice(&presented).is_ok());

        if accepted {
            Ok(())
        } else {
            Err(AuthorizationFailure::InvalidToken)
        }
    }

    fn signed(&self, scope: &TokenScope, tick: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(&(self.session.len() as u64).to_le_bytes());
        mac.update(self.session.as_bytes());
        mac.update(b"|");
        mac.update(scope.to_string().as_bytes());
        mac.update(b"|");
        mac.update(tick.to_string().as_bytes());
        mac
    }
}

fn tick(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(TICK_SECONDS)
}
