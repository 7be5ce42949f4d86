//! Pseudonymous local identity.

use crate::error::StoreError;
use crate::ids;
use crate::schema::User;
use crate::store::{LocalStore, USER_ID_KEY};
use tracing::{info, warn};

const ID_PREFIX: &str = "user-";
const ID_SUFFIX_LEN: usize = 13;
const DISPLAY_NAME_LABEL: &str = "Bürger";

#[derive(Clone)]
pub struct IdentityProvider {
    store: LocalStore,
}

impl IdentityProvider {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Returns the persisted identity, creating it on the first call.
    pub fn current_user(&self) -> User {
        let stored = self.store.transaction(|tx| -> Result<String, StoreError> {
            if let Some(id) = tx.read_scalar(USER_ID_KEY)? {
                return Ok(id);
            }
            let id = new_user_id();
            tx.write_scalar(USER_ID_KEY, &id)?;
            info!(user_id = %id, "created local identity");
            Ok(id)
        });

        let id = match stored {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "could not load or persist user id");
                new_user_id()
            }
        };

        User {
            display_name: display_name_for(&id),
            id,
        }
    }
}

fn new_user_id() -> String {
    format!("{ID_PREFIX}{}", ids::random_suffix(ID_SUFFIX_LEN))
}

pub fn display_name_for(id: &str) -> String {
    let tag: String = id.chars().skip(5).take(5).collect();
    format!("{DISPLAY_NAME_LABEL} {}", tag.to_uppercase())
}
