use std::env;
use std::path::PathBuf;

const WATCHED: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

fn main() {
    for variable in WATCHED {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // Only Windows builds need help locating FFmpeg.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows")
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=vidsample: FFMPEG_DIR is not set. Install FFmpeg with vcpkg and point FFMPEG_DIR at it."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let install = PathBuf::from(vcpkg_root).join("installed").join(triplet);

    if !install.exists() {
        println!(
            "cargo:warning=vidsample: no vcpkg FFmpeg install under {}",
            install.display()
        );
        return;
    }

    println!(
        "cargo:warning=vidsample: found vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to use it explicitly",
        install.display()
    );
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!("cargo:warning=vidsample: set VCPKGRS_DYNAMIC=1 for dynamic vcpkg FFmpeg builds");
    }
}
