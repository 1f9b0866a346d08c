use std::fmt;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use shared::error::{Error, Result};

/// SRTP protection profiles negotiated through the `use_srtp` extension.
/// https://tools.ietf.org/html/rfc5764#section-4.1.2
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SrtpProtectionProfile {
    Srtp_Aes128_Cm_Hmac_Sha1_80 = 0x0001,
    Srtp_Aes128_Cm_Hmac_Sha1_32 = 0x0002,
    Unsupported,
}

impl From<u16> for SrtpProtectionProfile {
    fn from(val: u16) -> Self {
        match val {
            0x0001 => SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
            0x0002 => SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32,
            _ => SrtpProtectionProfile::Unsupported,
        }
    }
}

impl fmt::Display for SrtpProtectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80 => "SRTP_AES128_CM_HMAC_SHA1_80",
            SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32 => "SRTP_AES128_CM_HMAC_SHA1_32",
            SrtpProtectionProfile::Unsupported => "Unsupported",
        };
        write!(f, "{s}")
    }
}

/// ```text
/// uint8 SRTPProtectionProfile[2];
///
/// struct {
///    SRTPProtectionProfiles SRTPProtectionProfiles;
///    opaque srtp_mki<0..255>;
/// } UseSRTPData;
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionUseSrtp {
    pub protection_profiles: Vec<SrtpProtectionProfile>,
    pub mki: Vec<u8>,
}

impl ExtensionUseSrtp {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(2 * self.protection_profiles.len() as u16)?;
        for profile in &self.protection_profiles {
            writer.write_u16::<BigEndian>(*profile as u16)?;
        }
        writer.write_u8(self.mki.len() as u8)?;
        writer.write_all(&self.mki)?;
        Ok(())
    }

    pub fn unmarshal<R: Read>(reader: &mut R) -> Result<Self> {
        let profiles_len = reader.read_u16::<BigEndian>()? as usize;
        if profiles_len % 2 != 0 {
            return Err(Error::ErrLengthMismatch);
        }
        let mut protection_profiles = Vec::with_capacity(profiles_len / 2);
        for _ in 0..profiles_len / 2 {
            protection_profiles.push(reader.read_u16::<BigEndian>()?.into());
        }

        let mki_len = reader.read_u8()? as usize;
        let mut mki = vec![0u8; mki_len];
        reader.read_exact(&mut mki)?;

        Ok(ExtensionUseSrtp {
            protection_profiles,
            mki,
        })
    }
}

/// Server side selection: the first of our profiles the client offered.
pub(crate) fn find_matching_srtp_profile(
    remote: &[SrtpProtectionProfile],
    local: &[SrtpProtectionProfile],
) -> Option<SrtpProtectionProfile> {
    local.iter().find(|p| remote.contains(p)).copied()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_find_matching_srtp_profile() {
        use SrtpProtectionProfile::*;
        assert_eq!(
            find_matching_srtp_profile(
                &[Srtp_Aes128_Cm_Hmac_Sha1_32, Srtp_Aes128_Cm_Hmac_Sha1_80],
                &[Srtp_Aes128_Cm_Hmac_Sha1_80, Srtp_Aes128_Cm_Hmac_Sha1_32],
            ),
            Some(Srtp_Aes128_Cm_Hmac_Sha1_80)
        );
        assert_eq!(
            find_matching_srtp_profile(&[Srtp_Aes128_Cm_Hmac_Sha1_32], &[Srtp_Aes128_Cm_Hmac_Sha1_80]),
            None
        );
        assert_eq!(SrtpProtectionProfile::from(7), Unsupported);
    }

    #[test]
    fn test_extension_use_srtp_wire_format() -> Result<()> {
        let extension = ExtensionUseSrtp {
            protection_profiles: vec![
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32,
            ],
            mki: vec![],
        };
        let mut raw = vec![];
        extension.marshal(&mut raw)?;
        assert_eq!(raw, vec![0x00, 0x04, 0x00, 0x01, 0x00, 0x02, 0x00]);

        let mut reader = raw.as_slice();
        assert_eq!(ExtensionUseSrtp::unmarshal(&mut reader)?, extension);

        let mut odd: &[u8] = &[0x00, 0x03, 0x00, 0x01, 0x00, 0x00];
        assert_eq!(
            ExtensionUseSrtp::unmarshal(&mut odd),
            Err(Error::ErrLengthMismatch)
        );
        Ok(())
    }
}
