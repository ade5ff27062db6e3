use actix_web::{error, HttpRequest};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Checks a OneBot `sha1=<hex>` signature against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(digest) = signature.and_then(|value| value.trim().strip_prefix("sha1=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Without a configured secret every post is accepted.
pub fn verify_request(
    req: &HttpRequest,
    body: &[u8],
    secret: Option<&str>,
) -> Result<(), actix_web::Error> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match signature {
        None => Err(error::ErrorUnauthorized("Missing event signature")),
        Some(_) if !verify_signature(secret, body, signature) => {
            Err(error::ErrorUnauthorized("Invalid event signature"))
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test::TestRequest};

    const BODY: &[u8] = r#"{"post_type":"message","message_type":"private","user_id":1,"message":"/增发 1 0x0"}"#.as_bytes();

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn matches_known_hmac_sha1_vector() {
        let body = b"The quick brown fox jumps over the lazy dog";
        let signature = "sha1=de7c9b85b8b78aa6bc8a7a36f70a90701c9db4d9";
        assert!(verify_signature("key", body, Some(signature)));
        assert!(!verify_signature("other", body, Some(signature)));
    }

    #[test]
    fn rejects_malformed_signatures() {
        assert!(!verify_signature("key", BODY, None));
        assert!(!verify_signature("key", BODY, Some("md5=abcd")));
        assert!(!verify_signature("key", BODY, Some("sha1=not-hex")));
    }

    #[test]
    fn signed_request_passes() {
        let req = TestRequest::default()
            .insert_header((SIGNATURE_HEADER, sign("s3cret", BODY)))
            .to_http_request();
        assert!(verify_request(&req, BODY, Some("s3cret")).is_ok());
    }

    #[test]
    fn forged_or_unsigned_request_is_unauthorized() {
        let forged = TestRequest::default()
            .insert_header((SIGNATURE_HEADER, sign("guess", BODY)))
            .to_http_request();
        let err = verify_request(&forged, BODY, Some("s3cret")).unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);

        let tampered = TestRequest::default()
            .insert_header((SIGNATURE_HEADER, sign("s3cret", BODY)))
            .to_http_request();
        let err = verify_request(&tampered, b"{\"user_id\":10001}", Some("s3cret")).unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);

        let unsigned = TestRequest::default().to_http_request();
        let err = verify_request(&unsigned, BODY, Some("s3cret")).unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn no_secret_accepts_everything() {
        let req = TestRequest::default().to_http_request();
        assert!(verify_request(&req, BODY, None).is_ok());
    }
}
