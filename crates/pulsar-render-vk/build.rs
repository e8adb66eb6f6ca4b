use std::{env, fs, path::PathBuf};

// Particle integration: one invocation per particle, reading last frame's
// buffer (binding 1) and writing this frame's (binding 2). Velocity flips at
// the clip-space border.
const COMPUTE_SRC: &str = r#"
#version 450
layout(local_size_x = 256) in;

struct Particle {
    vec2 position;
    vec2 velocity;
    vec4 color;
};

layout(std140, set = 0, binding = 0) uniform Params {
    float deltaTime;
    uint particleCount;
} params;

layout(std430, set = 0, binding = 1) readonly buffer ParticlesIn {
    Particle particlesIn[];
};

layout(std430, set = 0, binding = 2) buffer ParticlesOut {
    Particle particlesOut[];
};

void main() {
    uint i = gl_GlobalInvocationID.x;
    if (i >= params.particleCount) {
        return;
    }
    Particle p = particlesIn[i];
    p.position += p.velocity * params.deltaTime;
    if (p.position.x <= -1.0 || p.position.x >= 1.0) {
        p.velocity.x = -p.velocity.x;
    }
    if (p.position.y <= -1.0 || p.position.y >= 1.0) {
        p.velocity.y = -p.velocity.y;
    }
    particlesOut[i] = p;
}
"#;

// Matches `Particle`: location 0 = position (offset 0), location 1 = color (offset 16).
// POINT_SIZE is specialized at pipeline creation from the device's point limits.
const VERTEX_SRC: &str = r#"
#version 450
layout(constant_id = 0) const float POINT_SIZE = 14.0;

layout(location = 0) in vec2 inPosition;
layout(location = 1) in vec4 inColor;

layout(location = 0) out vec3 vColor;

void main() {
    gl_PointSize = POINT_SIZE;
    gl_Position = vec4(inPosition, 1.0, 1.0);
    vColor = inColor.rgb;
}
"#;

// Round, soft-edged points.
const FRAGMENT_SRC: &str = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    vec2 coord = gl_PointCoord - vec2(0.5);
    outColor = vec4(vColor, 0.5 - length(coord));
}
"#;

// Matches `MeshVertex`: position, colour, texcoord at locations 0..2.
const MODEL_VERTEX_SRC: &str = r#"
#version 450
layout(set = 0, binding = 0) uniform Transforms {
    mat4 model;
    mat4 view;
    mat4 proj;
} xf;

layout(location = 0) in vec3 inPosition;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inTexCoord;

layout(location = 0) out vec3 vColor;
layout(location = 1) out vec2 vTexCoord;

void main() {
    gl_Position = xf.proj * xf.view * xf.model * vec4(inPosition, 1.0);
    vColor = inColor;
    vTexCoord = inTexCoord;
}
"#;

const MODEL_FRAGMENT_SRC: &str = r#"
#version 450
layout(set = 0, binding = 1) uniform sampler2D albedo;

layout(location = 0) in vec3 vColor;
layout(location = 1) in vec2 vTexCoord;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = texture(albedo, vTexCoord) * vec4(vColor, 1.0);
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let stages = [
        (COMPUTE_SRC, shaderc::ShaderKind::Compute, "particles.comp"),
        (VERTEX_SRC, shaderc::ShaderKind::Vertex, "particles.vert"),
        (FRAGMENT_SRC, shaderc::ShaderKind::Fragment, "particles.frag"),
        (MODEL_VERTEX_SRC, shaderc::ShaderKind::Vertex, "model.vert"),
        (MODEL_FRAGMENT_SRC, shaderc::ShaderKind::Fragment, "model.frag"),
    ];
    for (src, kind, name) in stages {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }

    println!("cargo:rerun-if-changed=build.rs");
}
