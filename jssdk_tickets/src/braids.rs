use aliri_braid::braid;
use std::fmt;

/// Formats a credential without giving it away
///
/// `Display` only names the credential. `Debug` also shows the first
/// `$prefix` characters, enough to tell two values apart in logs, unless the
/// value is too short for that to be safe.
macro_rules! redacted {
    ($ty:ty, $name:literal, prefix = $prefix:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!($name, "("))?;
                write_prefix(self.as_str(), $prefix, f)?;
                f.write_str(")")
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("<redacted ", $name, ">"))
            }
        }
    };
}

fn write_prefix(value: &str, prefix: usize, f: &mut fmt::Formatter) -> fmt::Result {
    // At least twice the prefix must stay hidden
    if prefix == 0 || value.chars().count() < prefix * 3 {
        return f.write_str("…");
    }

    let shown: String = value.chars().take(prefix).collect();
    write!(f, "{}…", shown)
}

/// A tenant identifier, the `appId` registered with the issuing authority
#[braid(serde)]
pub struct AppId;

/// The shared secret registered for a tenant
#[braid(serde, debug = "owned", display = "owned")]
pub struct AppSecret;

redacted!(AppSecretRef, "AppSecret", prefix = 0);

/// An access token issued by the authority
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

redacted!(AccessTokenRef, "AccessToken", prefix = 6);

/// A JS-SDK API ticket derived from an access token
#[braid(serde, debug = "owned", display = "owned")]
pub struct JsapiTicket;

redacted!(JsapiTicketRef, "JsapiTicket", prefix = 6);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_never_show_any_characters() {
        let secret = AppSecret::from_static("super-secret-value");
        assert_eq!(format!("{:?}", secret), "AppSecret(…)");
        assert_eq!(secret.to_string(), "<redacted AppSecret>");
    }

    #[test]
    fn long_credentials_show_a_prefix_in_debug() {
        let ticket = JsapiTicket::from_static("bxLdikRXVbTPdHSM05e5u5sUoXNKd8");
        assert_eq!(format!("{:?}", ticket), "JsapiTicket(bxLdik…)");
        assert_eq!(format!("{:?}", &*ticket), "JsapiTicket(bxLdik…)");
        assert_eq!(ticket.to_string(), "<redacted JsapiTicket>");
    }

    #[test]
    fn short_credentials_hide_everything() {
        let token = AccessToken::from_static("token-1");
        assert_eq!(format!("{:?}", token), "AccessToken(…)");
    }

    #[test]
    fn app_ids_are_not_secret() {
        let app_id = AppId::from_static("wx1234");
        assert_eq!(app_id.to_string(), "wx1234");
    }
}
