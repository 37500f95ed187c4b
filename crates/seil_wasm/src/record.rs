//! Byte layout of the parameter transfer record: twelve little-endian
//! IEEE-754 doubles in the order Λ, β, δ, ρ, μ, k, r1, r2, φ, γ, d1, d2.

use anyhow::{bail, Result};
use js_sys::Float64Array;
use wasm_bindgen::prelude::*;

pub const RECORD_LEN: usize = 12;
pub const RECORD_BYTES: usize = RECORD_LEN * 8;

pub fn decode_record(bytes: &[u8]) -> Result<[f64; RECORD_LEN]> {
    if bytes.len() != RECORD_BYTES {
        bail!(
            "Parameter record must be {} bytes, got {}.",
            RECORD_BYTES,
            bytes.len()
        );
    }
    let mut record = [0.0; RECORD_LEN];
    for (value, chunk) in record.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        *value = f64::from_le_bytes(raw);
    }
    Ok(record)
}

pub fn encode_record(record: &[f64; RECORD_LEN]) -> Vec<u8> {
    record.iter().flat_map(|value| value.to_le_bytes()).collect()
}

pub fn record_from_slice(values: &[f64]) -> Result<[f64; RECORD_LEN]> {
    match <[f64; RECORD_LEN]>::try_from(values) {
        Ok(record) => Ok(record),
        Err(_) => bail!(
            "Expected {} parameter values, got {}.",
            RECORD_LEN,
            values.len()
        ),
    }
}

#[wasm_bindgen]
pub fn decode_parameters(bytes: &[u8]) -> Result<Float64Array, JsValue> {
    let record =
        decode_record(bytes).map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
    Ok(Float64Array::from(&record[..]))
}

#[wasm_bindgen]
pub fn encode_parameters(params: Vec<f64>) -> Result<Vec<u8>, JsValue> {
    let record =
        record_from_slice(&params).map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
    Ok(encode_record(&record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seil_core::Parameters;

    #[test]
    fn decodes_fields_in_record_order() {
        let mut bytes = Vec::new();
        for i in 0..RECORD_LEN {
            bytes.extend_from_slice(&(i as f64 + 0.5).to_le_bytes());
        }
        let params = Parameters::from_record(decode_record(&bytes).unwrap());
        assert_eq!(params.recruitment, 0.5);
        assert_eq!(params.transmission, 1.5);
        assert_eq!(params.natural_death, 4.5);
        assert_eq!(params.lost_death, 11.5);
    }

    #[test]
    fn encoding_is_little_endian() {
        let mut record = [0.0; RECORD_LEN];
        record[0] = 1.0;
        let bytes = encode_record(&record);
        assert_eq!(bytes.len(), RECORD_BYTES);
        // 1.0 = 0x3FF0_0000_0000_0000
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
        assert_eq!(decode_record(&bytes).unwrap(), record);
    }

    #[test]
    fn rejects_wrong_lengths() {
        let err = decode_record(&[0u8; 95]).unwrap_err();
        assert!(err.to_string().contains("96 bytes, got 95"));
        assert!(decode_record(&[0u8; 104]).is_err());
        assert!(record_from_slice(&[1.0; 11]).is_err());
        assert!(record_from_slice(&[1.0; 12]).is_ok());
    }
}
