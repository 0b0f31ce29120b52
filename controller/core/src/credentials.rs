//! Required fields of the credentials that may be stored in secrets.

use ahash::AHashMap as HashMap;
use thiserror::Error;

/// The secret data key naming a secret's credential type.
pub const CREDENTIAL_TYPE_KEY: &str = "kongCredType";

const KEY_AUTH: &[&str] = &["key"];
const BASIC_AUTH: &[&str] = &["username", "password"];
const HMAC_AUTH: &[&str] = &["username", "secret"];
const JWT: &[&str] = &["algorithm", "rsa_public_key", "key", "secret"];
const OAUTH2: &[&str] = &["name", "client_id", "client_secret", "redirect_uris"];
const ACL: &[&str] = &["group"];
const MTLS_AUTH: &[&str] = &["subject_name"];

/// Maps each credential type to the ordered list of fields a credential of
/// that type must carry.
///
/// Type names are matched case-sensitively. The table is built once and is
/// never modified afterwards.
#[derive(Clone, Debug)]
pub struct CredentialFields(HashMap<&'static str, &'static [&'static str]>);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("invalid credential type: {0}")]
    UnknownType(String),

    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

// === impl CredentialFields ===

impl Default for CredentialFields {
    fn default() -> Self {
        let table = [
            ("key-auth", KEY_AUTH),
            ("keyauth_credential", KEY_AUTH),
            ("basic-auth", BASIC_AUTH),
            ("basicauth_credential", BASIC_AUTH),
            ("hmac-auth", HMAC_AUTH),
            ("hmacauth_credential", HMAC_AUTH),
            ("jwt", JWT),
            ("jwt_secret", JWT),
            ("oauth2", OAUTH2),
            ("acl", ACL),
            ("mtls-auth", MTLS_AUTH),
        ];
        Self(table.into_iter().collect())
    }
}

impl CredentialFields {
    /// Returns the required fields for `cred_type`, in declaration order.
    pub fn required(&self, cred_type: &str) -> Option<&'static [&'static str]> {
        self.0.get(cred_type).copied()
    }

    /// Checks that every field required by `cred_type` is present.
    ///
    /// Only presence is checked; field contents are opaque. All missing fields
    /// are reported, in declaration order.
    pub fn check(
        &self,
        cred_type: &str,
        has_field: impl Fn(&str) -> bool,
    ) -> Result<(), CredentialError> {
        let required = self
            .required(cred_type)
            .ok_or_else(|| CredentialError::UnknownType(cred_type.to_string()))?;

        let missing = required
            .iter()
            .copied()
            .filter(|field| !has_field(field))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(CredentialError::MissingFields(missing));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;
    use std::collections::BTreeSet;

    fn check(cred_type: &str, present: BTreeSet<&str>) -> Result<(), CredentialError> {
        CredentialFields::default().check(cred_type, |f| present.contains(f))
    }

    #[test]
    fn aliases_share_fields() {
        let fields = CredentialFields::default();
        for (a, b) in [
            ("key-auth", "keyauth_credential"),
            ("basic-auth", "basicauth_credential"),
            ("hmac-auth", "hmacauth_credential"),
            ("jwt", "jwt_secret"),
        ] {
            assert_eq!(fields.required(a), fields.required(b), "{a} / {b}");
        }
    }

    #[test]
    fn jwt_field_order() {
        assert_eq!(
            CredentialFields::default().required("jwt"),
            Some(&["algorithm", "rsa_public_key", "key", "secret"][..])
        );
    }

    #[test]
    fn unknown_type() {
        let err = check("Key-Auth", btreeset! {"key"}).unwrap_err();
        assert_eq!(err.to_string(), "invalid credential type: Key-Auth");
    }

    #[test]
    fn basic_auth_missing_password() {
        let err = check("basic-auth", btreeset! {"username"}).unwrap_err();
        assert_eq!(err.to_string(), "missing required field(s): password");
    }

    #[test]
    fn reports_every_missing_field_in_order() {
        let err = check("oauth2", btreeset! {"client_id"}).unwrap_err();
        assert_eq!(
            err,
            CredentialError::MissingFields(vec!["name", "client_secret", "redirect_uris"])
        );
        assert_eq!(
            err.to_string(),
            "missing required field(s): name, client_secret, redirect_uris"
        );
    }

    #[test]
    fn complete_credentials() {
        assert_eq!(check("acl", btreeset! {"group"}), Ok(()));
        assert_eq!(check("mtls-auth", btreeset! {"subject_name", "extra"}), Ok(()));
        assert_eq!(
            check(
                "jwt_secret",
                btreeset! {"algorithm", "rsa_public_key", "key", "secret"}
            ),
            Ok(())
        );
    }
}
