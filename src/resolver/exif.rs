use asclepius_common::Orientation;
use std::io::Cursor;

/// EXIF Orientation を読み取る（EXIFなし・読み取り失敗は None）
pub fn read_orientation(bytes: &[u8]) -> Option<Orientation> {
    let mut cursor = Cursor::new(bytes);
    let exif_reader = exif::Reader::new();
    let exif = exif_reader.read_from_container(&mut cursor).ok()?;

    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0).map(Orientation::from_exif)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_exif_returns_none() {
        assert_eq!(read_orientation(b"not an image"), None);
        assert_eq!(read_orientation(&[]), None);
    }
}
