// LNC Core Library implementing a non-custodial Lightning Network client
//
// Written in 2023-2026 by
//     LNC Contributors
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Per-hop TLV payloads of the payment onion (BOLT-4).

use amplify::{Slice32, Wrapper};
use lnc_encoding::{tlv, Error as EncodingError, LightningDecode};
use lnc_p2p::bolt::ShortChannelId;

const TLV_AMT_TO_FORWARD: u64 = 2;
const TLV_OUTGOING_CLTV: u64 = 4;
const TLV_SHORT_CHANNEL_ID: u64 = 6;
const TLV_PAYMENT_DATA: u64 = 8;

// Truncated big-endian integers: leading zero bytes are omitted and
// must not be present on decode.
fn encode_tu64(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|byte| **byte == 0).count();
    bytes[skip..].to_vec()
}

fn decode_tu64(data: &[u8]) -> Result<u64, EncodingError> {
    if data.len() > 8 || (!data.is_empty() && data[0] == 0) {
        return Err(EncodingError::DataIntegrityError(s!(
            "non-minimal truncated integer"
        )));
    }
    let mut bytes = [0u8; 8];
    bytes[8 - data.len()..].copy_from_slice(data);
    Ok(u64::from_be_bytes(bytes))
}

fn decode_tu32(data: &[u8]) -> Result<u32, EncodingError> {
    if data.len() > 4 {
        return Err(EncodingError::DataIntegrityError(s!(
            "truncated u32 exceeds four bytes"
        )));
    }
    decode_tu64(data).map(|value| value as u32)
}

/// Payment metadata for the final hop: the invoice secret plus the total
/// amount across a multi-part payment
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PaymentData {
    pub payment_secret: Slice32,
    pub total_msat: u64,
}

/// The decrypted payload one hop reads from the onion
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HopPayload {
    /// Amount to forward to (or receive at) the next stage
    pub amt_to_forward: u64,

    /// CLTV value for the outgoing HTLC (or the required final expiry)
    pub outgoing_cltv_value: u32,

    /// Channel to forward through; absent for the final hop
    pub short_channel_id: Option<ShortChannelId>,

    /// Present only for the final hop
    pub payment_data: Option<PaymentData>,
}

impl HopPayload {
    /// Intermediate-hop payload
    pub fn forward(
        amt_to_forward: u64,
        outgoing_cltv_value: u32,
        short_channel_id: ShortChannelId,
    ) -> HopPayload {
        HopPayload {
            amt_to_forward,
            outgoing_cltv_value,
            short_channel_id: Some(short_channel_id),
            payment_data: None,
        }
    }

    /// Final-hop payload
    pub fn receive(
        amount_msat: u64,
        final_cltv: u32,
        payment_secret: Slice32,
        total_msat: u64,
    ) -> HopPayload {
        HopPayload {
            amt_to_forward: amount_msat,
            outgoing_cltv_value: final_cltv,
            short_channel_id: None,
            payment_data: Some(PaymentData {
                payment_secret,
                total_msat,
            }),
        }
    }

    /// Whether this payload terminates the route
    #[inline]
    pub fn is_final(&self) -> bool {
        self.short_channel_id.is_none()
    }

    /// Serializes the TLV body (without the length prefix used inside
    /// the onion frame)
    pub fn serialize(&self) -> Result<Vec<u8>, EncodingError> {
        let mut stream = tlv::Stream::new();
        stream
            .insert(TLV_AMT_TO_FORWARD, encode_tu64(self.amt_to_forward))?;
        stream.insert(
            TLV_OUTGOING_CLTV,
            encode_tu64(self.outgoing_cltv_value as u64),
        )?;
        if let Some(short_channel_id) = self.short_channel_id {
            stream.insert(
                TLV_SHORT_CHANNEL_ID,
                short_channel_id.to_u64().to_be_bytes().to_vec(),
            )?;
        }
        if let Some(payment_data) = self.payment_data {
            let mut value =
                payment_data.payment_secret.as_inner().to_vec();
            value.extend(encode_tu64(payment_data.total_msat));
            stream.insert(TLV_PAYMENT_DATA, value)?;
        }
        lnc_encoding::lightning_serialize(&stream)
    }

    /// Parses a TLV payload body
    pub fn deserialize(data: &[u8]) -> Result<HopPayload, EncodingError> {
        let mut stream = tlv::Stream::lightning_deserialize(data)?;
        let amt_to_forward = stream
            .remove(TLV_AMT_TO_FORWARD)
            .map(|value| decode_tu64(value.as_inner()))
            .transpose()?
            .unwrap_or_default();
        let outgoing_cltv_value = stream
            .remove(TLV_OUTGOING_CLTV)
            .map(|value| decode_tu32(value.as_inner()))
            .transpose()?
            .unwrap_or_default();
        let short_channel_id = stream
            .remove(TLV_SHORT_CHANNEL_ID)
            .map(|value| {
                <[u8; 8]>::lightning_deserialize(value.as_inner())
                    .map(u64::from_be_bytes)
                    .map(ShortChannelId::from_u64)
            })
            .transpose()?;
        let payment_data = stream
            .remove(TLV_PAYMENT_DATA)
            .map(|value| -> Result<PaymentData, EncodingError> {
                let data = value.as_inner();
                if data.len() < 32 {
                    return Err(EncodingError::DataIntegrityError(s!(
                        "payment_data is shorter than the payment secret"
                    )));
                }
                let mut secret = [0u8; 32];
                secret.copy_from_slice(&data[..32]);
                Ok(PaymentData {
                    payment_secret: Slice32::from_inner(secret),
                    total_msat: decode_tu64(&data[32..])?,
                })
            })
            .transpose()?;
        stream.check_no_unknown_even(&[])?;
        Ok(HopPayload {
            amt_to_forward,
            outgoing_cltv_value,
            short_channel_id,
            payment_data,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forward_payload_roundtrip() {
        let payload = HopPayload::forward(
            100_500,
            500_058,
            ShortChannelId::with(600_000, 12, 1),
        );
        let data = payload.serialize().unwrap();
        assert_eq!(HopPayload::deserialize(&data).unwrap(), payload);
        assert!(!payload.is_final());
    }

    #[test]
    fn receive_payload_roundtrip() {
        let payload = HopPayload::receive(
            100_000,
            500_018,
            Slice32::from_inner([3u8; 32]),
            100_000,
        );
        let data = payload.serialize().unwrap();
        let decoded = HopPayload::deserialize(&data).unwrap();
        assert_eq!(decoded, payload);
        assert!(decoded.is_final());
        assert_eq!(
            decoded.payment_data.unwrap().payment_secret,
            Slice32::from_inner([3u8; 32])
        );
    }

    #[test]
    fn truncated_ints_are_minimal() {
        assert_eq!(encode_tu64(0), Vec::<u8>::new());
        assert_eq!(encode_tu64(1), vec![1]);
        assert_eq!(encode_tu64(256), vec![1, 0]);
        assert_eq!(decode_tu64(&[1, 0]).unwrap(), 256);
        assert!(decode_tu64(&[0, 1]).is_err());
    }
}
