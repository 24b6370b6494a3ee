use crate::account_key::{AccountKey, Algorithm};
use crate::base64::Base64;
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::sign::Signer;
use thiserror::Error;

/// ES256 簽章中 `r` 與 `s` 各自的固定長度。
const P256_COORDINATE_LEN: i32 = 32;

/// 定義簽名操作可能遇到的錯誤類型。
#[derive(Debug, Error)]
pub enum SignatureError {
    /// 簽名過程中發生錯誤。
    #[error("Failed to sign data")]
    SigningError(#[source] ErrorStack),
    /// 簽名結果無法轉換為 JWS 格式。
    #[error("Failed to encode signature")]
    EncodingError(#[source] ErrorStack),
}

/// 定義簽名演算法的介面。
///
/// 實作此介面的類型需提供對指定資料進行簽名的功能，並回傳 JWS 規範要求的簽章位元組。
trait SignatureAlgorithmT {
    fn sign(&self, data: &[u8], key: &AccountKey) -> Result<Vec<u8>, SignatureError>;
}

/// RS256：PKCS#1 v1.5 填充搭配 SHA-256。
struct RsaSignature;

impl SignatureAlgorithmT for RsaSignature {
    fn sign(&self, data: &[u8], key: &AccountKey) -> Result<Vec<u8>, SignatureError> {
        sha256_sign(data, key)
    }
}

/// ES256：ECDSA P-256 搭配 SHA-256，輸出 `r || s` 而非 DER。
struct EcdsaSignature;

impl SignatureAlgorithmT for EcdsaSignature {
    fn sign(&self, data: &[u8], key: &AccountKey) -> Result<Vec<u8>, SignatureError> {
        let der = sha256_sign(data, key)?;
        let sig = EcdsaSig::from_der(&der).map_err(SignatureError::EncodingError)?;

        let mut raw = sig
            .r()
            .to_vec_padded(P256_COORDINATE_LEN)
            .map_err(SignatureError::EncodingError)?;
        raw.extend(
            sig.s()
                .to_vec_padded(P256_COORDINATE_LEN)
                .map_err(SignatureError::EncodingError)?,
        );
        Ok(raw)
    }
}

fn sha256_sign(data: &[u8], key: &AccountKey) -> Result<Vec<u8>, SignatureError> {
    let mut signer = Signer::new(MessageDigest::sha256(), &key.pri_key)
        .map_err(SignatureError::SigningError)?;

    signer
        .update(data)
        .map_err(SignatureError::SigningError)?;

    signer
        .sign_to_vec()
        .map_err(SignatureError::SigningError)
}

/// 根據演算法標籤取得對應的簽名演算法實作。
fn algorithm_for(alg: Algorithm) -> Box<dyn SignatureAlgorithmT> {
    match alg {
        Algorithm::Rs256 => Box::new(RsaSignature),
        Algorithm::Es256 => Box::new(EcdsaSignature),
    }
}

/// 對任意位元組簽名，依帳戶金鑰的演算法分派。
pub fn sign(message: &[u8], key: &AccountKey) -> Result<Vec<u8>, SignatureError> {
    algorithm_for(key.alg).sign(message, key)
}

/// 根據提供的 header、payload 與金鑰，生成對應的 JWS 簽名。
///
/// 簽名輸入為 `"{protected_b64}.{payload_b64}"` 的位元組。
pub fn create_signature(
    header_b64: &Base64,
    payload_b64: &Base64,
    key: &AccountKey,
) -> Result<Base64, SignatureError> {
    let signing_input = format!("{}.{}", header_b64.as_str(), payload_b64.as_str());
    let signature = sign(signing_input.as_bytes(), key)?;

    Ok(Base64::new(signature))
}

#[cfg(test)]
pub(crate) mod tests {
    use openssl::bn::BigNum;
    use openssl::sign::Verifier;

    use super::*;
    use crate::account_key::tests::{ec_key, rsa_key};

    /// 依 JWS 規範驗證簽章，ES256 會先把 `r || s` 轉回 DER。
    pub(crate) fn verify(key: &AccountKey, message: &[u8], signature: &[u8]) -> bool {
        let signature = match key.alg {
            Algorithm::Rs256 => signature.to_vec(),
            Algorithm::Es256 => {
                assert_eq!(signature.len(), 64);
                let r = BigNum::from_slice(&signature[..32]).unwrap();
                let s = BigNum::from_slice(&signature[32..]).unwrap();
                EcdsaSig::from_private_components(r, s)
                    .unwrap()
                    .to_der()
                    .unwrap()
            }
        };
        let mut verifier = Verifier::new(MessageDigest::sha256(), &key.pub_key).unwrap();
        verifier.update(message).unwrap();
        verifier.verify(&signature).unwrap()
    }

    #[test]
    fn test_rs256_signature_verifies() {
        let key = rsa_key();
        let signature = sign(b"payload", &key).unwrap();
        assert_eq!(signature.len(), 256);
        assert!(verify(&key, b"payload", &signature));
        assert!(!verify(&key, b"tampered", &signature));
    }

    #[test]
    fn test_es256_signature_is_fixed_width() {
        let key = ec_key();
        for _ in 0..16 {
            let signature = sign(b"payload", &key).unwrap();
            assert_eq!(signature.len(), 64);
            assert!(verify(&key, b"payload", &signature));
        }
    }

    #[test]
    fn test_error_keeps_openssl_source() {
        let error = SignatureError::SigningError(ErrorStack::get());
        assert_eq!(error.to_string(), "Failed to sign data");
        assert!(std::error::Error::source(&error).is_some());

        let error: Box<dyn std::error::Error + Send + Sync> =
            Box::new(SignatureError::EncodingError(ErrorStack::get()));
        assert_eq!(error.to_string(), "Failed to encode signature");
    }

    #[test]
    fn test_create_signature_covers_header_and_payload() {
        let key = ec_key();
        let header = Base64::new(r#"{"alg":"ES256"}"#);
        let payload = Base64::new("{}");
        let signature = create_signature(&header, &payload, &key).unwrap();

        let input = format!("{}.{}", header.as_str(), payload.as_str());
        assert!(verify(&key, input.as_bytes(), &signature.decode().unwrap()));
    }
}
