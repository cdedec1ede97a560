// src/crypto.rs: payload key management
use cinet_protocol::{BlockCipher, MessageCodec};
use tracing::info;

use crate::config::Settings;
use crate::errors::BeaconError;

/// Codec for the configured identity, keyed from the stored passphrase.
/// The 1000-round derivation runs once per boot.
pub fn build_codec(settings: &Settings) -> Result<MessageCodec, BeaconError> {
    let identity = settings.identity()?;
    let cipher = BlockCipher::from_passphrase(&settings.passphrase)?;
    info!(serial = %identity.serial, key = format_args!("{:08X}", identity.device_key), "payload key derived");
    Ok(MessageCodec::with_cipher(identity, cipher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinet_protocol::{AlertMask, DeviceStatus, PositionFix, ProtocolError};

    #[test]
    fn codec_uses_the_stored_passphrase() {
        let settings = Settings { passphrase: "other".into(), ..Settings::default() };
        let mut codec = build_codec(&settings).unwrap();
        let msg = codec.build(&PositionFix::default(), &DeviceStatus::default(), AlertMask::empty());

        let same = MessageCodec::new(settings.identity().unwrap(), "other").unwrap();
        assert!(same.open(&msg).is_ok());
        let factory = MessageCodec::new(settings.identity().unwrap(), "fredfred").unwrap();
        assert!(factory.open(&msg).is_err());
    }

    #[test]
    fn bad_device_key_is_reported() {
        let settings = Settings { cinet_key: "nonsense".into(), ..Settings::default() };
        assert!(matches!(
            build_codec(&settings),
            Err(BeaconError::Protocol(ProtocolError::DeviceKey(_)))
        ));
    }
}
