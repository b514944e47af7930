//! Multi-word values are stored as a single opaque token.
//!
//! Escaping is percent style: `%` and every whitespace character are written
//! as `%XX` per UTF-8 byte (a space is `%20`). Decoding passes malformed
//! escapes through untouched, so every token decodes.

pub fn encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    let mut buf = [0; 4];
    for c in value.chars() {
        if c == '%' || c.is_whitespace() {
            for b in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{:02X}", b));
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

pub fn decode(token: &str) -> String {
    let bytes = token.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = token
                .get(i + 1..i + 3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = escape {
                decoded.push(b);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
