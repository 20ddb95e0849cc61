#![no_main]

use libfuzzer_sys::fuzz_target;
use mssql_integrated_auth::krb5_conf::Krb5Config;

fuzz_target!(|data: &[u8]| {
    // Fuzz krb5.conf parsing
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = Krb5Config::parse(s) {
            if let Some(realm) = config.default_realm() {
                let _ = config.kdcs(realm);
            }
        }
    }
});
