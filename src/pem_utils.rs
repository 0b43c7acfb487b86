use crate::error::{Error, Result};

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF))
}

/// Parse the first PEM block of `pem_str`, returning its label and DER contents.
pub fn pem_to_der(pem_str: &str) -> Result<(String, Vec<u8>)> {
    let pem = pem::parse(pem_str)?;
    Ok((pem.tag().to_string(), pem.contents().to_vec()))
}

/// Like [`pem_to_der`], but rejects blocks whose label is not one of `labels`.
pub fn pem_to_der_expecting(pem_str: &str, labels: &[&str]) -> Result<(String, Vec<u8>)> {
    let (label, der) = pem_to_der(pem_str)?;
    if !labels.contains(&label.as_str()) {
        return Err(Error::DecodingError(format!(
            "unexpected PEM block '{label}', expected one of {labels:?}"
        )));
    }
    Ok((label, der))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_label_is_rejected() {
        let pem = der_to_pem(&[1, 2, 3], "PUBLIC KEY");
        let err = pem_to_der_expecting(&pem, &["CERTIFICATE"]).unwrap_err();
        assert!(matches!(err, Error::DecodingError(_)));
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        assert!(matches!(
            pem_to_der("not pem at all"),
            Err(Error::DecodingError(_))
        ));
    }
}
