macro_rules! register_diagnostics {
    ( $( $error_code:ident ),* $(,)* ) => {
        /// An array of `(error_code, diagnostic)`.
        #[cfg(feature = "diagnostics")]
        pub static DIAGNOSTICS: &[(&str, &str)] = &[
            $(
                (
                    stringify!($error_code),
                    concat!(
                        "\n",
                        include_str!(concat!("./error_codes/", stringify!($error_code), ".md")),
                    ),
                )
            ),*
        ];
    };
}

register_diagnostics!(E000, E001, E002, E003, E004, E005, E006, E007);
