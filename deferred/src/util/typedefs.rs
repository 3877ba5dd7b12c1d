/// A string which uses SmallString optimization for strings shorter than 23 characters.
pub type SsoString = smartstring::SmartString<smartstring::LazyCompact>;

#[macro_export]
/// Similar to the [`format`] macro, but creates a [`SsoString`].
macro_rules! format_sso {
    ($($arg:tt)*) => {{
        use std::fmt::Write as _;
        let mut buffer = $crate::util::typedefs::SsoString::new();
        write!(buffer, $($arg)*).expect("unexpected formatting error");
        buffer
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn formats_into_a_small_string() {
        let label = crate::format_sso!("cascade {} of {}", 2, 4);
        assert_eq!(label.as_str(), "cascade 2 of 4");
    }
}
