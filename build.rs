use cfg_aliases::cfg_aliases;

fn main() {
    cfg_aliases! {
        free_unix: { all(unix, not(target_os = "macos"), not(target_os = "android"), not(target_os = "ios")) },
        x11_platform: { all(feature = "x11", free_unix) },
        glx_backend: { all(feature = "glx", x11_platform) },
        wgl_backend: { all(feature = "wgl", windows) },
    }

    println!("cargo:rerun-if-changed=build.rs");
}
