// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 构建脚本: 静态链接FFmpeg (RTSP拉流) 时补充系统库
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // 仅在Windows MSVC环境下需要 (vcpkg 静态库不会自动带上这些系统依赖)
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // RTSP/TCP 网络
        println!("cargo:rustc-link-lib=dylib=ws2_32");

        // Secure Channel (rtsps / TLS)
        println!("cargo:rustc-link-lib=dylib=secur32");

        // 随机数 (libavutil)
        println!("cargo:rustc-link-lib=dylib=bcrypt");
    }
}
