//! Token signing hook.
//!
//! Latchkey doesn't implement token cryptography itself. The raw token
//! names a store entry; what the client carries is a sealed form of it,
//! produced and checked by a [`TokenSigner`]. Plug in whatever your
//! deployment uses (AEAD encryption, HMAC signatures, a KMS).

use rand::Rng;

/// Mints raw tokens and seals them for transport.
///
/// # Trait bounds
///
/// - `Send + Sync` → the signer is shared by every request thread.
/// - `'static` → it lives as long as the session manager.
pub trait TokenSigner: Send + Sync + 'static {
    /// Creates a fresh, unguessable raw token.
    ///
    /// Raw tokens become store keys, so they must be plain ASCII
    /// (alphanumerics, `-`, `_`).
    fn generate_token(&self) -> String;

    /// Seals a raw token into the form sent to the client.
    fn encrypt_for_transport(&self, token: &str) -> String;

    /// Opens a sealed token presented by a client.
    ///
    /// Returns `None` if it was tampered with or was never issued by this
    /// signer.
    fn decrypt_and_verify(&self, sealed: &str) -> Option<String>;
}

/// A signer that issues random hex tokens and sends them as-is.
///
/// Tokens carry 128 bits of randomness, but nothing is encrypted or
/// signed: any well-formed token is accepted back. Use it for
/// development and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenSigner;

impl RandomTokenSigner {
    /// Length of a generated token in hex characters.
    pub const TOKEN_LEN: usize = 32;
}

impl TokenSigner for RandomTokenSigner {
    fn generate_token(&self) -> String {
        let bytes: [u8; 16] = rand::rng().random();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn encrypt_for_transport(&self, token: &str) -> String {
        token.to_string()
    }

    fn decrypt_and_verify(&self, sealed: &str) -> Option<String> {
        let well_formed = sealed.len() == Self::TOKEN_LEN
            && sealed.bytes().all(|b| b.is_ascii_hexdigit());
        well_formed.then(|| sealed.to_string())
    }
}
