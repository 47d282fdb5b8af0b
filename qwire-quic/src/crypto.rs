//! Initial packet protection (RFC 9001 Section 5, RFC 9369 Section 3.3).
//!
//! Initial secrets are derived from the destination connection ID with
//! HKDF-SHA256, packets are sealed/opened with AES-128-GCM, and header
//! protection uses an AES-128-ECB mask over a 16-byte ciphertext sample.
//! All primitives go through BoringSSL.

use boring_sys as ffi;
use std::ptr;

use crate::error::{Error, Result};
use crate::packet::{InitialHeader, VERSION_V1, VERSION_V2};
use crate::varint;

const INITIAL_SALT_V1: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c,
    0xad, 0xcc, 0xbb, 0x7f, 0x0a,
];

const INITIAL_SALT_V2: [u8; 20] = [
    0x0d, 0xed, 0xe3, 0xde, 0xf7, 0x00, 0xa6, 0xdb, 0x81, 0x93, 0x81, 0xbe, 0x6e, 0x26, 0x9d,
    0xcb, 0xf9, 0xbd, 0x2e, 0xd9,
];

const AES_128_KEY_LEN: usize = 16;
const AEAD_IV_LEN: usize = 12;
const AEAD_TAG_LEN: usize = 16;
const HP_SAMPLE_LEN: usize = 16;

/// Which endpoint's Initial write keys to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

struct VersionParams {
    salt: &'static [u8; 20],
    key_label: &'static str,
    iv_label: &'static str,
    hp_label: &'static str,
}

fn version_params(version: u32) -> Result<VersionParams> {
    match version {
        VERSION_V1 => Ok(VersionParams {
            salt: &INITIAL_SALT_V1,
            key_label: "quic key",
            iv_label: "quic iv",
            hp_label: "quic hp",
        }),
        VERSION_V2 => Ok(VersionParams {
            salt: &INITIAL_SALT_V2,
            key_label: "quicv2 key",
            iv_label: "quicv2 iv",
            hp_label: "quicv2 hp",
        }),
        other => Err(Error::UnsupportedVersion(other)),
    }
}

/// Initial-level AEAD and header-protection keys for one direction.
pub struct InitialKeys {
    key: [u8; AES_128_KEY_LEN],
    iv: [u8; AEAD_IV_LEN],
    hp: [u8; AES_128_KEY_LEN],
}

impl InitialKeys {
    /// Derive the Initial keys for `side` from a packet's destination
    /// connection ID, per RFC 9001 Section 5.2.
    pub fn derive(version: u32, dcid: &[u8], side: Side) -> Result<Self> {
        let params = version_params(version)?;
        let initial_secret = hkdf_extract(params.salt, dcid)?;
        let label = match side {
            Side::Client => "client in",
            Side::Server => "server in",
        };
        let secret = hkdf_expand_label(&initial_secret, label, 32)?;

        let mut keys = InitialKeys {
            key: [0; AES_128_KEY_LEN],
            iv: [0; AEAD_IV_LEN],
            hp: [0; AES_128_KEY_LEN],
        };
        keys.key
            .copy_from_slice(&hkdf_expand_label(&secret, params.key_label, AES_128_KEY_LEN)?);
        keys.iv
            .copy_from_slice(&hkdf_expand_label(&secret, params.iv_label, AEAD_IV_LEN)?);
        keys.hp
            .copy_from_slice(&hkdf_expand_label(&secret, params.hp_label, AES_128_KEY_LEN)?);
        Ok(keys)
    }

    /// Remove header protection and decrypt the payload of a parsed
    /// Initial packet.
    ///
    /// Returns the plaintext frame bytes.
    pub fn open(&self, header: &InitialHeader<'_>) -> Result<Vec<u8>> {
        if header.payload.len() < 4 + HP_SAMPLE_LEN {
            return Err(Error::BufferTooShort {
                need: 4 + HP_SAMPLE_LEN,
                have: header.payload.len(),
            });
        }

        // The sample starts 4 bytes past the start of the packet number
        // field (RFC 9001 Section 5.4.2).
        let mut sample = [0u8; HP_SAMPLE_LEN];
        sample.copy_from_slice(&header.payload[4..4 + HP_SAMPLE_LEN]);
        let mask = hp_mask(&self.hp, &sample)?;

        let first = header.first_byte ^ (mask[0] & 0x0f);
        let pn_len = usize::from(first & 0x03) + 1;
        if header.payload.len() < pn_len + AEAD_TAG_LEN {
            return Err(Error::BufferTooShort {
                need: pn_len + AEAD_TAG_LEN,
                have: header.payload.len(),
            });
        }

        let mut pn_bytes = [0u8; 4];
        let mut packet_number = 0u64;
        for i in 0..pn_len {
            pn_bytes[i] = header.payload[i] ^ mask[1 + i];
            packet_number = (packet_number << 8) | u64::from(pn_bytes[i]);
        }

        let mut aad = Vec::with_capacity(header.header_bytes.len() + pn_len);
        aad.push(first);
        aad.extend_from_slice(&header.header_bytes[1..]);
        aad.extend_from_slice(&pn_bytes[..pn_len]);

        let nonce = self.nonce_for(packet_number, pn_len);
        let plaintext = aead_open(&self.key, &nonce, &aad, &header.payload[pn_len..])?;

        tracing::trace!(packet_number, plaintext_len = plaintext.len(), "opened Initial packet");
        Ok(plaintext)
    }

    /// Build a protected Initial packet around `frames`.
    ///
    /// The inverse of [`open`](Self::open): writes the long header, seals
    /// the frame bytes, and applies header protection. The packet number
    /// is encoded in two bytes.
    pub fn seal_packet(
        &self,
        version: u32,
        dcid: &[u8],
        scid: &[u8],
        packet_number: u64,
        frames: &[u8],
    ) -> Result<Vec<u8>> {
        version_params(version)?;
        const PN_LEN: usize = 2;

        let type_bits = if version == VERSION_V2 { 0x10 } else { 0x00 };
        let first = 0xc0 | type_bits | (PN_LEN as u8 - 1);
        let length = (PN_LEN + frames.len() + AEAD_TAG_LEN) as u64;

        let mut packet = Vec::with_capacity(
            7 + dcid.len() + scid.len() + varint::encoded_len(length) + length as usize,
        );
        packet.push(first);
        packet.extend_from_slice(&version.to_be_bytes());
        packet.push(dcid.len() as u8);
        packet.extend_from_slice(dcid);
        packet.push(scid.len() as u8);
        packet.extend_from_slice(scid);
        packet.push(0); // no token
        varint::encode(length, &mut packet)?;

        let pn_offset = packet.len();
        packet.extend_from_slice(&(packet_number as u16).to_be_bytes());

        let nonce = self.nonce_for(packet_number, PN_LEN);
        let ciphertext = aead_seal(&self.key, &nonce, &packet, frames)?;
        packet.extend_from_slice(&ciphertext);

        let mut sample = [0u8; HP_SAMPLE_LEN];
        sample.copy_from_slice(&packet[pn_offset + 4..pn_offset + 4 + HP_SAMPLE_LEN]);
        let mask = hp_mask(&self.hp, &sample)?;
        packet[0] ^= mask[0] & 0x0f;
        for i in 0..PN_LEN {
            packet[pn_offset + i] ^= mask[1 + i];
        }

        Ok(packet)
    }

    fn nonce_for(&self, packet_number: u64, pn_len: usize) -> [u8; AEAD_IV_LEN] {
        let mut nonce = self.iv;
        let offset = AEAD_IV_LEN - pn_len;
        for i in 0..pn_len {
            nonce[offset + i] ^= (packet_number >> (8 * (pn_len - 1 - i))) as u8;
        }
        nonce
    }
}

fn hkdf_extract(salt: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    unsafe {
        let mut out = vec![0u8; ffi::EVP_MAX_MD_SIZE as usize];
        let mut out_len: usize = 0;
        if ffi::HKDF_extract(
            out.as_mut_ptr(),
            &mut out_len,
            ffi::EVP_sha256(),
            secret.as_ptr(),
            secret.len(),
            salt.as_ptr(),
            salt.len(),
        ) != 1
        {
            return Err(Error::crypto("HKDF_extract failed"));
        }
        out.truncate(out_len);
        Ok(out)
    }
}

fn hkdf_expand(prk: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    unsafe {
        let mut out = vec![0u8; len];
        if ffi::HKDF_expand(
            out.as_mut_ptr(),
            len,
            ffi::EVP_sha256(),
            prk.as_ptr(),
            prk.len(),
            info.as_ptr(),
            info.len(),
        ) != 1
        {
            return Err(Error::crypto("HKDF_expand failed"));
        }
        Ok(out)
    }
}

fn hkdf_expand_label(secret: &[u8], label: &str, len: usize) -> Result<Vec<u8>> {
    let full_label = format!("tls13 {label}");
    let mut info = Vec::with_capacity(4 + full_label.len());
    info.extend_from_slice(&(len as u16).to_be_bytes());
    info.push(full_label.len() as u8);
    info.extend_from_slice(full_label.as_bytes());
    info.push(0); // empty context
    hkdf_expand(secret, &info, len)
}

struct AeadCtx(ffi::EVP_AEAD_CTX);

impl AeadCtx {
    fn new(key: &[u8]) -> Result<Self> {
        unsafe {
            let mut ctx: ffi::EVP_AEAD_CTX = std::mem::zeroed();
            if ffi::EVP_AEAD_CTX_init(
                &mut ctx,
                ffi::EVP_aead_aes_128_gcm(),
                key.as_ptr(),
                key.len(),
                ffi::EVP_AEAD_DEFAULT_TAG_LENGTH as usize,
                ptr::null_mut(),
            ) != 1
            {
                return Err(Error::crypto("EVP_AEAD_CTX_init failed"));
            }
            Ok(AeadCtx(ctx))
        }
    }
}

impl Drop for AeadCtx {
    fn drop(&mut self) {
        unsafe { ffi::EVP_AEAD_CTX_cleanup(&mut self.0) };
    }
}

fn aead_seal(key: &[u8], nonce: &[u8; AEAD_IV_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut ctx = AeadCtx::new(key)?;
    let mut out = vec![0u8; plaintext.len() + AEAD_TAG_LEN];
    let mut out_len = 0;
    unsafe {
        if ffi::EVP_AEAD_CTX_seal(
            &mut ctx.0,
            out.as_mut_ptr(),
            &mut out_len,
            out.len(),
            nonce.as_ptr(),
            nonce.len(),
            plaintext.as_ptr(),
            plaintext.len(),
            aad.as_ptr(),
            aad.len(),
        ) != 1
        {
            return Err(Error::crypto("EVP_AEAD_CTX_seal failed"));
        }
    }
    out.truncate(out_len);
    Ok(out)
}

fn aead_open(key: &[u8], nonce: &[u8; AEAD_IV_LEN], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut ctx = AeadCtx::new(key)?;
    let mut out = vec![0u8; ciphertext.len()];
    let mut out_len = 0;
    unsafe {
        if ffi::EVP_AEAD_CTX_open(
            &mut ctx.0,
            out.as_mut_ptr(),
            &mut out_len,
            out.len(),
            nonce.as_ptr(),
            nonce.len(),
            ciphertext.as_ptr(),
            ciphertext.len(),
            aad.as_ptr(),
            aad.len(),
        ) != 1
        {
            return Err(Error::crypto("AEAD decryption failed"));
        }
    }
    out.truncate(out_len);
    Ok(out)
}

fn hp_mask(hp_key: &[u8], sample: &[u8; HP_SAMPLE_LEN]) -> Result<[u8; 5]> {
    unsafe {
        let ctx = ffi::EVP_CIPHER_CTX_new();
        if ctx.is_null() {
            return Err(Error::crypto("EVP_CIPHER_CTX_new failed"));
        }

        struct CipherCtx(*mut ffi::EVP_CIPHER_CTX);
        impl Drop for CipherCtx {
            fn drop(&mut self) {
                unsafe { ffi::EVP_CIPHER_CTX_free(self.0) };
            }
        }
        let _guard = CipherCtx(ctx);

        if ffi::EVP_EncryptInit_ex(
            ctx,
            ffi::EVP_aes_128_ecb(),
            ptr::null_mut(),
            hp_key.as_ptr(),
            ptr::null_mut(),
        ) != 1
        {
            return Err(Error::crypto("EVP_EncryptInit_ex failed"));
        }

        let mut out = [0u8; 32];
        let mut out_len = 0;
        if ffi::EVP_EncryptUpdate(
            ctx,
            out.as_mut_ptr(),
            &mut out_len,
            sample.as_ptr(),
            sample.len() as i32,
        ) != 1
        {
            return Err(Error::crypto("EVP_EncryptUpdate failed"));
        }

        let mut mask = [0u8; 5];
        mask.copy_from_slice(&out[..5]);
        Ok(mask)
    }
}
