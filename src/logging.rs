use std::fmt;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "snippetbox=info,tower_http=info";

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Sanitized wrapper for email addresses that masks the local part
#[derive(Debug, Clone)]
pub struct SanitizedEmail(String);

impl SanitizedEmail {
    pub fn new(email: impl AsRef<str>) -> Self {
        Self(Self::sanitize(email.as_ref()))
    }

    fn sanitize(email: &str) -> String {
        match email.split_once('@') {
            Some((local, domain)) => {
                let len = local.chars().count();
                let masked_local = if len <= 2 {
                    "*".repeat(len)
                } else {
                    let first = local.chars().next().unwrap_or('*');
                    format!("{first}***")
                };
                format!("{masked_local}@{domain}")
            }
            None => "***@***".to_string(),
        }
    }
}

impl fmt::Display for SanitizedEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sanitized wrapper for IP addresses that masks the last octet
#[derive(Debug, Clone)]
pub struct SanitizedIpAddr(String);

impl SanitizedIpAddr {
    pub fn new(ip: impl fmt::Display) -> Self {
        Self(Self::sanitize(&ip.to_string()))
    }

    fn sanitize(ip: &str) -> String {
        if let Some(last_dot) = ip.rfind('.') {
            format!("{}.***", &ip[..last_dot])
        } else if let Some(last_colon) = ip.rfind(':') {
            format!("{}:****", &ip[..last_colon])
        } else {
            "***".to_string()
        }
    }
}

impl fmt::Display for SanitizedIpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security event types for structured logging
#[derive(Debug, Clone, Copy)]
pub enum SecurityEvent {
    SignupSuccess,
    SignupFailure,
    LoginSuccess,
    LoginFailure,
    Logout,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::SignupSuccess => "signup_success",
            SecurityEvent::SignupFailure => "signup_failure",
            SecurityEvent::LoginSuccess => "login_success",
            SecurityEvent::LoginFailure => "login_failure",
            SecurityEvent::Logout => "logout",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            SecurityEvent::LoginFailure | SecurityEvent::SignupFailure
        )
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log a security event with sanitized context
#[macro_export]
macro_rules! log_security_event {
    ($event:expr, $($field:tt)*) => {
        if $event.is_critical() {
            tracing::warn!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        } else {
            tracing::info!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        }
    };
}

pub async fn log_request(request: Request, next: Next) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| SanitizedIpAddr::new(addr.ip()).to_string())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(
        remote_addr = %remote_addr,
        proto = ?request.version(),
        method = %request.method(),
        uri = %request.uri(),
        "Received request"
    );

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_email() {
        assert_eq!(
            SanitizedEmail::new("user@example.com").to_string(),
            "u***@example.com"
        );
        assert_eq!(
            SanitizedEmail::new("ab@test.com").to_string(),
            "**@test.com"
        );
        assert_eq!(SanitizedEmail::new("a@test.com").to_string(), "*@test.com");
        assert_eq!(SanitizedEmail::new("invalid-email").to_string(), "***@***");
    }

    #[test]
    fn test_sanitize_email_multibyte_local_part() {
        assert_eq!(
            SanitizedEmail::new("élodie@example.com").to_string(),
            "é***@example.com"
        );
    }

    #[test]
    fn test_sanitize_ipv4() {
        assert_eq!(
            SanitizedIpAddr::new("192.168.1.100").to_string(),
            "192.168.1.***"
        );
    }

    #[test]
    fn test_sanitize_ipv6() {
        assert_eq!(
            SanitizedIpAddr::new("2001:db8::8a2e:370:7334").to_string(),
            "2001:db8::8a2e:370:****"
        );
    }

    #[test]
    fn test_security_event_critical() {
        assert!(SecurityEvent::LoginFailure.is_critical());
        assert!(SecurityEvent::SignupFailure.is_critical());
        assert!(!SecurityEvent::LoginSuccess.is_critical());
        assert!(!SecurityEvent::Logout.is_critical());
    }
}
