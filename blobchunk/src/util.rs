use std::path::Path;

pub fn format_size(bytes: u64) -> String {
    use humansize::{FormatSize, BINARY};
    bytes.format_size(BINARY)
}

/// Manifest name of a walked file: relative to the walk root, `/`-separated.
pub fn manifest_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let name = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if name.is_empty() {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_relative_to_root() {
        assert_eq!(
            manifest_name(Path::new("rootfs"), Path::new("rootfs/etc/hostname")),
            "etc/hostname"
        );
    }

    #[test]
    fn a_root_file_uses_its_file_name() {
        assert_eq!(
            manifest_name(Path::new("data/blob.bin"), Path::new("data/blob.bin")),
            "blob.bin"
        );
    }

    #[test]
    fn sizes_are_binary() {
        assert_eq!(format_size(1024), "1 KiB");
    }
}
