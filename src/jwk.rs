use openssl::{
    bn::{BigNum, BigNumContext},
    ec::{EcGroup, EcKey},
    nid::Nid,
    pkey::{Id, PKey, Private, Public},
    rsa::{Rsa, RsaPrivateKeyBuilder},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::base64::{Base64, DecodeError};

/// JWK相關操作的錯誤類型。
///
/// 此錯誤類型涵蓋JWK解析、金鑰轉換與序列化過程中可能發生的錯誤，
/// 並提供對應的錯誤訊息以輔助除錯。
#[derive(Debug, Error)]
pub enum JwkError {
    /// 不支援的金鑰類型（`kty`）。
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),
    /// 不支援的橢圓曲線。
    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),
    /// 缺少必要欄位。
    #[error("Missing JWK member: {0}")]
    MissingMember(&'static str),
    /// 欄位不是合法的 Base64 URL 編碼。
    #[error("Invalid JWK member {0}: {1}")]
    InvalidMember(&'static str, DecodeError),
    /// 金鑰轉換失敗。
    #[error("Failed to convert key")]
    KeyConversionError(#[from] openssl::error::ErrorStack),
    /// 序列化錯誤。
    #[error("Malformed JWK document")]
    SerializationError(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, JwkError>;

/// 帳戶金鑰檔所使用的 JSON Web Key，支援 RSA 與 EC P-256。
#[derive(Debug, Clone)]
pub enum Jwk {
    Rsa(RsaJwk),
    Ec(EcJwk),
}

/// RSA 格式的 JWK，私鑰參數為選填，僅公鑰時用於計算 thumbprint。
#[derive(Debug, Clone, Deserialize)]
pub struct RsaJwk {
    n: String,
    e: String,
    d: Option<String>,
    p: Option<String>,
    q: Option<String>,
    dp: Option<String>,
    dq: Option<String>,
    qi: Option<String>,
}

/// EC 格式的 JWK。
#[derive(Debug, Clone, Deserialize)]
pub struct EcJwk {
    crv: String,
    x: String,
    y: String,
    d: Option<String>,
}

impl Jwk {
    /// 解析 JWK 文件。
    ///
    /// `kty` 只接受 `RSA` 與 `EC`，其他類型回傳 [`JwkError::UnsupportedKeyType`]。
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let kty = value
            .get("kty")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(JwkError::MissingMember("kty"))?;

        match kty.as_str() {
            "RSA" => Ok(Jwk::Rsa(serde_json::from_value(value)?)),
            "EC" => {
                let jwk: EcJwk = serde_json::from_value(value)?;
                if jwk.crv != "P-256" {
                    return Err(JwkError::UnsupportedCurve(jwk.crv));
                }
                Ok(Jwk::Ec(jwk))
            }
            other => Err(JwkError::UnsupportedKeyType(other.to_owned())),
        }
    }

    /// 由公鑰建立僅含公開參數的 JWK。
    pub fn from_public_key(pub_key: &PKey<Public>) -> Result<Self> {
        match pub_key.id() {
            Id::RSA => {
                let rsa = pub_key.rsa()?;
                Ok(Jwk::Rsa(RsaJwk {
                    n: Base64::new(rsa.n().to_vec()).base64_url(),
                    e: Base64::new(rsa.e().to_vec()).base64_url(),
                    d: None,
                    p: None,
                    q: None,
                    dp: None,
                    dq: None,
                    qi: None,
                }))
            }
            Id::EC => {
                let ec = pub_key.ec_key()?;
                let group = ec.group();
                if group.curve_name() != Some(Nid::X9_62_PRIME256V1) {
                    return Err(JwkError::UnsupportedCurve(format!(
                        "{:?}",
                        group.curve_name()
                    )));
                }
                let mut ctx = BigNumContext::new()?;
                let mut x = BigNum::new()?;
                let mut y = BigNum::new()?;
                ec.public_key()
                    .affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)?;
                Ok(Jwk::Ec(EcJwk {
                    crv: "P-256".to_owned(),
                    x: Base64::new(x.to_vec_padded(32)?).base64_url(),
                    y: Base64::new(y.to_vec_padded(32)?).base64_url(),
                    d: None,
                }))
            }
            other => Err(JwkError::UnsupportedKeyType(format!("{:?}", other))),
        }
    }

    /// 將 JWK 中的私鑰參數轉換為 OpenSSL 私鑰。
    pub fn to_private_key(&self) -> Result<PKey<Private>> {
        match self {
            Jwk::Rsa(jwk) => jwk.to_private_key(),
            Jwk::Ec(jwk) => jwk.to_private_key(),
        }
    }

    /// 產生 RFC 7638 規範的 JSON 表示：只含必要的公開參數，依字典序排列且無空白。
    pub fn to_thumbprint_json(&self) -> Result<String> {
        let mut map = Map::new();
        match self {
            Jwk::Rsa(jwk) => {
                map.insert("e".to_string(), Value::String(jwk.e.clone()));
                map.insert("kty".to_string(), Value::String("RSA".to_string()));
                map.insert("n".to_string(), Value::String(jwk.n.clone()));
            }
            Jwk::Ec(jwk) => {
                map.insert("crv".to_string(), Value::String(jwk.crv.clone()));
                map.insert("kty".to_string(), Value::String("EC".to_string()));
                map.insert("x".to_string(), Value::String(jwk.x.clone()));
                map.insert("y".to_string(), Value::String(jwk.y.clone()));
            }
        }

        serde_json::to_string(&Value::Object(map)).map_err(JwkError::from)
    }
}

impl RsaJwk {
    fn to_private_key(&self) -> Result<PKey<Private>> {
        let n = decode_member("n", &self.n)?;
        let e = decode_member("e", &self.e)?;
        let d = decode_member("d", required("d", &self.d)?)?;

        let rsa = match (&self.p, &self.q, &self.dp, &self.dq, &self.qi) {
            (Some(p), Some(q), Some(dp), Some(dq), Some(qi)) => Rsa::from_private_components(
                n,
                e,
                d,
                decode_member("p", p)?,
                decode_member("q", q)?,
                decode_member("dp", dp)?,
                decode_member("dq", dq)?,
                decode_member("qi", qi)?,
            )?,
            // 沒有 CRT 參數時退回只用 (n, e, d)
            _ => RsaPrivateKeyBuilder::new(n, e, d)?.build(),
        };

        Ok(PKey::from_rsa(rsa)?)
    }
}

impl EcJwk {
    fn to_private_key(&self) -> Result<PKey<Private>> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let x = decode_member("x", &self.x)?;
        let y = decode_member("y", &self.y)?;
        let d = decode_member("d", required("d", &self.d)?)?;

        let public = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
        let private = EcKey::from_private_components(&group, &d, public.public_key())?;
        private.check_key()?;

        Ok(PKey::from_ec_key(private)?)
    }
}

fn required<'a>(name: &'static str, value: &'a Option<String>) -> Result<&'a str> {
    value.as_deref().ok_or(JwkError::MissingMember(name))
}

fn decode_member(name: &'static str, value: &str) -> Result<BigNum> {
    let bytes = Base64::from_url(value)
        .and_then(|b64| b64.decode())
        .map_err(|e| JwkError::InvalidMember(name, e))?;
    Ok(BigNum::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbprint_json_rfc7638_example() -> Result<()> {
        // RFC 7638 §3.1 的範例金鑰
        let jwk = Jwk::from_json(
            r#"{
                "kty": "RSA",
                "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                "e": "AQAB",
                "alg": "RS256",
                "kid": "2011-04-29"
            }"#,
        )?;

        assert_eq!(
            jwk.to_thumbprint_json()?,
            r#"{"e":"AQAB","kty":"RSA","n":"0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw"}"#
        );
        Ok(())
    }

    #[test]
    fn test_unsupported_key_type() {
        let result = Jwk::from_json(r#"{"kty":"oct","k":"AAAA"}"#);
        assert!(matches!(result, Err(JwkError::UnsupportedKeyType(kty)) if kty == "oct"));
    }

    #[test]
    fn test_unsupported_curve() {
        let result = Jwk::from_json(r#"{"kty":"EC","crv":"P-384","x":"AA","y":"AA","d":"AA"}"#);
        assert!(matches!(result, Err(JwkError::UnsupportedCurve(_))));
    }

    #[test]
    fn test_missing_private_member() -> Result<()> {
        let jwk = Jwk::from_json(r#"{"kty":"RSA","n":"AQAB","e":"AQAB"}"#)?;
        assert!(matches!(
            jwk.to_private_key(),
            Err(JwkError::MissingMember("d"))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_kty() {
        assert!(matches!(
            Jwk::from_json(r#"{"n":"AQAB"}"#),
            Err(JwkError::MissingMember("kty"))
        ));
    }
}
