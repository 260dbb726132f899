use crate::errors::*;
use bstr::{BString, ByteSlice};
use memchr::memmem;
use sequoia_openpgp::armor;
use std::io::Read;

pub const SIGNATURE_HEADER: &[u8] = b"gpgsig ";
pub const BEGIN_MARKER: &[u8] = b"-----BEGIN PGP SIGNATURE-----\n";
pub const END_MARKER: &[u8] = b"-----END PGP SIGNATURE-----";

/// Where a `gpgsig` header is accepted in the commit text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Anchoring {
    /// The first `gpgsig` followed by a BEGIN marker anywhere in the text, like git's own
    /// `cat-file` consumers usually do
    #[default]
    FirstMatch,
    /// Only at the start of a line within the header section
    Headers,
}

/// A commit split into the document that was signed and its detached signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedCommit {
    /// The commit text with the `gpgsig` header removed
    pub body: BString,
    /// The unfolded, armored signature
    pub signature: BString,
    /// The `gpgsig` header as it was removed from the commit, still folded
    pub field: BString,
    /// Position in `body` where the `gpgsig` header was removed
    pub offset: usize,
}

impl SignedCommit {
    pub fn from_bytes(text: &[u8]) -> Result<Self, ExtractError> {
        Self::from_bytes_with(text, Anchoring::FirstMatch)
    }

    pub fn from_bytes_with(text: &[u8], anchoring: Anchoring) -> Result<Self, ExtractError> {
        let start = find_anchor(text, anchoring).ok_or(ExtractError::NoSignatureField)?;
        let value = start + SIGNATURE_HEADER.len();
        trace!("Found signature header at offset {start}");

        let end = memmem::find_iter(&text[value..], END_MARKER)
            .map(|pos| value + pos)
            .find(|&pos| is_end_line(text, pos))
            .ok_or(ExtractError::MalformedSignatureBlock(
                "failed to find end of signature",
            ))?;
        // the END marker line is part of the field, including its newline if there is one
        let end = (end + END_MARKER.len() + 1).min(text.len());

        let mut signature = Vec::with_capacity(end - value);
        let mut lines = text[value..end].lines_with_terminator();
        if let Some(first) = lines.next() {
            signature.extend(first);
        }
        for line in lines {
            let line = if line == b"\n" {
                line
            } else {
                line.strip_prefix(b" ")
                    .ok_or(ExtractError::MalformedSignatureBlock(
                        "signature continuation line is not folded",
                    ))?
            };
            signature.extend(line);
        }

        let mut body = Vec::with_capacity(text.len() - (end - start));
        body.extend(&text[..start]);
        body.extend(&text[end..]);

        Ok(SignedCommit {
            body: BString::from(body),
            signature: BString::from(signature),
            field: BString::from(&text[start..end]),
            offset: start,
        })
    }

    /// Put the signature header back where it was taken from.
    pub fn to_commit_text(&self) -> BString {
        let mut out = Vec::with_capacity(self.body.len() + self.field.len());
        out.extend(&self.body[..self.offset]);
        out.extend(&self.field[..]);
        out.extend(&self.body[self.offset..]);
        BString::from(out)
    }

    /// Remove the ascii armor and return the binary signature packets.
    pub fn decode_signature(&self) -> Result<Vec<u8>, VerifyError> {
        dearmor_signature(&self.signature)
    }
}

pub fn dearmor_signature(armored: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let mut reader = armor::Reader::from_bytes(
        armored,
        armor::ReaderMode::Tolerant(Some(armor::Kind::Signature)),
    );

    let mut signature = Vec::new();
    reader
        .read_to_end(&mut signature)
        .map_err(|err| VerifyError::MalformedSignature(format!("{err:#}")))?;
    Ok(signature)
}

/// The END marker has to be a whole folded line.
fn is_end_line(text: &[u8], pos: usize) -> bool {
    let folded = text[..pos].ends_with(b"\n ");
    let terminated = matches!(text.get(pos + END_MARKER.len()), None | Some(b'\n'));
    folded && terminated
}

fn find_anchor(text: &[u8], anchoring: Anchoring) -> Option<usize> {
    let needle = [SIGNATURE_HEADER, BEGIN_MARKER].concat();
    match anchoring {
        Anchoring::FirstMatch => memmem::find(text, &needle),
        Anchoring::Headers => {
            let headers_end = memmem::find(text, b"\n\n")
                .map(|pos| pos + 1)
                .unwrap_or(text.len());
            memmem::find_iter(&text[..headers_end], &needle)
                .find(|&pos| pos == 0 || text[pos - 1] == b'\n')
        }
    }
}
