//! Store options applied when a session layer is built.

use satchel_store::Store;

/// A codec / lifetime knob for stores that support configuration.
///
/// Options are applied once, by
/// [`SessionLayerBuilder::build`](crate::SessionLayerBuilder::build).
/// A store without a configuration capability (see
/// [`Store::config_mut`]) ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOption {
    /// Session lifetime in seconds. `0` or less makes every save a delete.
    MaxAge(i64),
    /// Longest encoded cookie value. `0` disables the check.
    MaxLength(usize),
    /// Reject signatures younger than this many seconds. `0` disables.
    MinAge(i64),
}

impl SessionOption {
    /// Applies the option to `store`. Returns `false` if the store has no
    /// configuration capability and the option was ignored.
    pub fn apply<S: Store>(&self, store: &mut S) -> bool {
        let Some(config) = store.config_mut() else {
            tracing::debug!(option = ?self, "store is not configurable, option ignored");
            return false;
        };

        match *self {
            Self::MaxAge(secs) => config.set_max_age(secs),
            Self::MaxLength(len) => config.set_max_length(len),
            Self::MinAge(secs) => config.set_min_age(secs),
        }
        tracing::debug!(option = ?self, "store option applied");
        true
    }
}

#[cfg(test)]
mod tests {
    use satchel_store::{
        CookieStore, RequestContext, ResponseCookies, Session, StoreError,
    };

    use super::*;

    /// A store without configuration support.
    struct FixedStore;

    impl Store for FixedStore {
        fn new_session(&self, name: &str) -> Session {
            Session::new(name, Default::default())
        }

        async fn load(
            &self,
            _ctx: &RequestContext,
            name: &str,
        ) -> Result<Session, StoreError> {
            Ok(self.new_session(name))
        }

        async fn save(
            &self,
            _session: &mut Session,
            _cookies: &mut ResponseCookies,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_apply_max_age_updates_store_options() {
        let mut store = CookieStore::new(&[b"key"]).unwrap();

        let applied = SessionOption::MaxAge(60).apply(&mut store);

        assert!(applied);
        assert_eq!(store.options().max_age, 60);
        assert_eq!(store.codecs()[0].max_age(), 60);
    }

    #[test]
    fn test_apply_length_and_min_age_update_codecs() {
        let mut store = CookieStore::new(&[b"key"]).unwrap();

        SessionOption::MaxLength(2048).apply(&mut store);
        SessionOption::MinAge(3).apply(&mut store);

        assert_eq!(store.codecs()[0].max_length(), 2048);
        assert_eq!(store.codecs()[0].min_age(), 3);
    }

    #[test]
    fn test_apply_to_unconfigurable_store_is_ignored() {
        let mut store = FixedStore;

        let applied = SessionOption::MaxAge(60).apply(&mut store);

        assert!(!applied);
    }
}
