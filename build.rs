//! Stamps the build date and time into `RAYGL_BUILD_DATE` / `RAYGL_BUILD_TIME`
//! for `raygl --version`. Either can be pinned from the environment for
//! reproducible builds.

use time::format_description::{self, BorrowedFormatItem};
use time::OffsetDateTime;

fn stamp(var: &str, now: OffsetDateTime, description: &str) {
    let value = std::env::var(var).unwrap_or_else(|_| {
        format_description::parse_borrowed::<2>(description)
            .ok()
            .and_then(|items: Vec<BorrowedFormatItem<'_>>| now.format(&items).ok())
            .unwrap_or_else(|| "unknown".to_string())
    });
    println!("cargo:rustc-env={var}={value}");
    println!("cargo:rerun-if-env-changed={var}");
}

fn main() {
    let now = OffsetDateTime::now_utc();
    stamp("RAYGL_BUILD_DATE", now, "[month repr:short] [day padding:space] [year]");
    stamp("RAYGL_BUILD_TIME", now, "[hour]:[minute]:[second]");
}
