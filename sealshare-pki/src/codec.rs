//! DER, PEM, naming and time helpers shared by certificates and requests.
//!
//! Everything on the wire is standard X.509 / PKCS#10 DER. Decoding is
//! strict: the input must re-encode to exactly the same bytes, so the
//! signed portion checked later is the portion that was received.

use crate::error::{CaError, CaResult};
use chrono::{DateTime, Datelike, SubsecRound, Utc};
use const_oid::db::rfc4519::CN;
use der::asn1::{Any, GeneralizedTime, SetOfVec, UtcTime, Utf8StringRef};
use der::pem::{self, LineEnding};
use der::{DecodeOwned, Encode, Tag, Tagged};
use sha2::Sha256;
use spki::AlgorithmIdentifierOwned;
use std::time::Duration as StdDuration;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::time::Time;

pub(crate) const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub(crate) const REQUEST_LABEL: &str = "CERTIFICATE REQUEST";
/// Label still emitted by some older enrollment tools.
pub(crate) const LEGACY_REQUEST_LABEL: &str = "NEW CERTIFICATE REQUEST";

/// UTCTime covers 1950 through 2049; later dates use GeneralizedTime.
const UTC_TIME_END_YEAR: i32 = 2050;

pub(crate) fn pem_encode(label: &str, der: &[u8]) -> CaResult<String> {
    pem::encode_string(label, LineEnding::LF, der)
        .map_err(|e| CaError::Malformed(format!("PEM encoding: {e}")))
}

/// Decodes a single PEM block whose label is one of `labels`.
pub(crate) fn pem_decode(pem_text: &str, labels: &[&str]) -> CaResult<Vec<u8>> {
    let (label, der) = pem::decode_vec(pem_text.trim().as_bytes())
        .map_err(|e| CaError::Malformed(format!("PEM: {e}")))?;
    if !labels.contains(&label) {
        return Err(CaError::Malformed(format!(
            "unexpected PEM label '{label}', expected {}",
            labels[0]
        )));
    }
    Ok(der)
}

/// Decodes `bytes` and requires them to be the canonical DER encoding.
pub(crate) fn decode_canonical<T>(bytes: &[u8]) -> CaResult<T>
where
    T: DecodeOwned + Encode,
{
    let value = T::from_der(bytes)?;
    if value.to_der()? != bytes {
        return Err(CaError::Malformed("non-canonical DER encoding".into()));
    }
    Ok(value)
}

/// `CN=<common_name>` as a distinguished name.
pub(crate) fn name_from_common_name(common_name: &str) -> CaResult<Name> {
    let value = Any::encode_from(&Utf8StringRef::new(common_name)?)?;
    let attribute = AttributeTypeAndValue { oid: CN, value };
    let rdn = RelativeDistinguishedName(SetOfVec::try_from(vec![attribute])?);
    Ok(RdnSequence(vec![rdn]))
}

/// The first common name in `name`, if it is a text string.
pub(crate) fn common_name(name: &Name) -> Option<String> {
    let attribute = name
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|attribute| attribute.oid == CN)?;

    match attribute.value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
            std::str::from_utf8(attribute.value.value())
                .ok()
                .map(str::to_string)
        }
        _ => None,
    }
}

/// Drops sub-second precision; X.509 times carry whole seconds.
pub(crate) fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}

pub(crate) fn to_x509_time(at: DateTime<Utc>) -> CaResult<Time> {
    let secs = u64::try_from(at.timestamp())
        .map_err(|_| CaError::ValidityOutOfRange(format!("{at} is before 1970")))?;
    let since_epoch = StdDuration::from_secs(secs);
    let out_of_range = |e: der::Error| CaError::ValidityOutOfRange(format!("{at}: {e}"));

    if at.year() < UTC_TIME_END_YEAR {
        Ok(Time::UtcTime(
            UtcTime::from_unix_duration(since_epoch).map_err(out_of_range)?,
        ))
    } else {
        Ok(Time::GeneralTime(
            GeneralizedTime::from_unix_duration(since_epoch).map_err(out_of_range)?,
        ))
    }
}

pub(crate) fn from_x509_time(time: &Time) -> CaResult<DateTime<Utc>> {
    let secs = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| CaError::Malformed("certificate time out of range".into()))?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CaError::Malformed("certificate time out of range".into()))
}

/// RSASSA-PSS with SHA-256, MGF1-SHA-256 and a 32-byte salt: the only
/// algorithm this CA signs with.
pub(crate) fn pss_sha256_algorithm() -> CaResult<AlgorithmIdentifierOwned> {
    rsa::pss::get_default_pss_signature_algo_id::<Sha256>()
        .map_err(|e| CaError::Malformed(format!("PSS algorithm identifier: {e}")))
}
