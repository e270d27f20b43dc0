use std::{ffi::CStr, os::raw::c_char};

pub mod db {
    pub mod amd {
        pub const VENDOR: u32 = 0x1002;
    }
    pub mod apple {
        pub const VENDOR: u32 = 0x106B;
    }
    pub mod arm {
        pub const VENDOR: u32 = 0x13B5;
    }
    pub mod intel {
        pub const VENDOR: u32 = 0x8086;
    }
    pub mod mesa {
        // Mesa does not have a PCI vendor id, this is the `VkVendorId`.
        pub const VENDOR: u32 = 0x10005;
    }
    pub mod nvidia {
        pub const VENDOR: u32 = 0x10DE;
    }
    pub mod qualcomm {
        pub const VENDOR: u32 = 0x5143;
    }

    /// Hardware vendor name for a PCI vendor id, for log lines.
    pub fn vendor_name(vendor_id: u32) -> &'static str {
        match vendor_id {
            amd::VENDOR => "AMD",
            apple::VENDOR => "Apple",
            arm::VENDOR => "ARM",
            intel::VENDOR => "Intel",
            mesa::VENDOR => "Mesa",
            nvidia::VENDOR => "NVIDIA",
            qualcomm::VENDOR => "Qualcomm",
            _ => "unknown vendor",
        }
    }
}

pub(crate) fn cstr_from_bytes_until_nul(bytes: &[c_char]) -> Option<&CStr> {
    if bytes.contains(&0) {
        // Safety for `CStr::from_ptr`:
        // - We've ensured that the slice does contain a null terminator.
        // - The range is valid to read, because the slice covers it.
        // - The memory won't be changed, because the slice borrows it.
        unsafe { Some(CStr::from_ptr(bytes.as_ptr())) }
    } else {
        None
    }
}

/// Copy `text` into a fixed size C string field, truncating to keep the terminator.
pub(crate) fn write_c_chars(dst: &mut [c_char], text: &str) {
    let len = text.len().min(dst.len().saturating_sub(1));
    for (d, &b) in dst.iter_mut().zip(&text.as_bytes()[..len]) {
        *d = b as c_char;
    }
    for d in dst[len..].iter_mut() {
        *d = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_chars_round_trip_and_truncate() {
        let mut field = [1 as c_char; 8];
        write_c_chars(&mut field, "RADV");
        assert_eq!(cstr_from_bytes_until_nul(&field).unwrap().to_str(), Ok("RADV"));

        write_c_chars(&mut field, "much too long for this");
        assert_eq!(
            cstr_from_bytes_until_nul(&field).unwrap().to_str(),
            Ok("much to")
        );
    }

    #[test]
    fn unterminated() {
        let field = [b'a' as c_char; 4];
        assert!(cstr_from_bytes_until_nul(&field).is_none());
    }
}
