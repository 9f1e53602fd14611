// SPDX-License-Identifier: CEPL-1.0
// With `embedded-shaders`, compiles shaders/cube.{vert,frag} into OUT_DIR as
// vert.spv / frag.spv. Without it there is nothing to do.

fn main() {
    println!("cargo:rerun-if-changed=shaders/cube.vert");
    println!("cargo:rerun-if-changed=shaders/cube.frag");

    #[cfg(feature = "embedded-shaders")]
    embedded::compile_all();
}

#[cfg(feature = "embedded-shaders")]
mod embedded {
    use std::{env, fs, path::PathBuf};

    pub fn compile_all() {
        let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
        let comp = shaderc::Compiler::new().expect("shaderc compiler");
        let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
        opts.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );
        opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

        for (src, kind, spv) in [
            ("shaders/cube.vert", shaderc::ShaderKind::Vertex, "vert.spv"),
            ("shaders/cube.frag", shaderc::ShaderKind::Fragment, "frag.spv"),
        ] {
            let glsl = fs::read_to_string(src).unwrap_or_else(|e| panic!("read {src}: {e}"));
            let artifact = comp
                .compile_into_spirv(&glsl, kind, src, "main", Some(&opts))
                .unwrap_or_else(|e| panic!("compile {src}: {e}"));
            fs::write(out.join(spv), artifact.as_binary_u8())
                .unwrap_or_else(|e| panic!("write {spv}: {e}"));
        }
    }
}
