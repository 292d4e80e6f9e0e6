//! 无窗口演示
//!
//! 把几个球丢到一块布料上，再用 IK 把两节手臂弯向目标。运行：
//!
//! ```text
//! RUST_LOG=debug cargo run --features demo --bin demo
//! ```

use glam::Vec3;
use nalgebra::Vector3;

use motion_engine::physics::{IntegratorKind, ParticleWorld, Particles, PhysicsConfig};
use motion_engine::skeleton::{BoneDesc, DofFlags, IkSolver, SkeletonBuilder, ROOT};
use motion_engine::{Posture, Result};

const CLOTH_EDGE: usize = 12;
const CLOTH_SPACING: f32 = 0.1;

fn cloth_patch() -> Particles {
    let mut cloth = Particles::new(CLOTH_EDGE * CLOTH_EDGE);
    let half = (CLOTH_EDGE - 1) as f32 * CLOTH_SPACING * 0.5;
    for row in 0..CLOTH_EDGE {
        for col in 0..CLOTH_EDGE {
            let position = Vector3::new(
                col as f32 * CLOTH_SPACING - half,
                0.0,
                row as f32 * CLOTH_SPACING - half,
            );
            // 固定四角
            let corner = (row == 0 || row == CLOTH_EDGE - 1) && (col == 0 || col == CLOTH_EDGE - 1);
            cloth.push(position, Vector3::zeros(), if corner { 0.0 } else { 0.01 });
        }
    }
    cloth
}

fn run_particles(kind: IntegratorKind) {
    let config = PhysicsConfig {
        // 默认步长下足够覆盖 60 fps 一帧的子步数
        max_substep_count: 20,
        ..PhysicsConfig::with_integrator(kind)
    };
    let mut world = ParticleWorld::new(config);
    world.add_sphere(Vector3::new(0.0, 0.5, 0.0), 0.1);
    world.add_sphere(Vector3::new(0.05, 0.8, 0.0), 0.1);
    world.add_sphere(Vector3::new(-0.3, 0.4, 0.2), 0.15);
    world.set_cloth(cloth_patch());

    let mut sphere_contacts = 0;
    let mut cloth_contacts = 0;
    let steps = (1.0 / world.config().delta_time).round() as usize;
    for _ in 0..steps {
        let stats = world.step();
        sphere_contacts += stats.sphere_contacts;
        cloth_contacts += stats.cloth_contacts;
    }

    // 再按帧推进：每次 1/60 s
    let substeps: u32 = (0..30).map(|_| world.step_simulation(1.0 / 60.0)).sum();

    let spheres = world.spheres();
    log::info!(
        "{:?}: t={:.3}s ({} paced substeps), contacts sphere={} cloth={}, kinetic energy {:.4}",
        kind,
        world.time(),
        substeps,
        sphere_contacts,
        cloth_contacts,
        spheres.particles().kinetic_energy()
    );
    for i in 0..spheres.len() {
        log::info!("  sphere {} at {:?}", i, spheres.particles().position(i));
    }
}

fn run_ik() -> Result<()> {
    let mut builder = SkeletonBuilder::new().scale(1.0);
    let upper = builder.add_bone(BoneDesc::new("upper", Vec3::X, 1.0).with_dof(DofFlags::ROTATION));
    let lower = builder.add_bone(BoneDesc::new("lower", Vec3::X, 1.0).with_dof(DofFlags::ROTATE_Z));
    builder.connect(ROOT, upper).connect(upper, lower);
    let mut skeleton = builder.build()?;

    let mut posture = Posture::new(skeleton.len());
    posture.set_euler(lower, Vec3::new(0.0, 0.0, 0.3));

    let target = Vec3::new(0.8, 1.1, 0.4);
    let report = IkSolver::default().solve(&mut skeleton, target, upper, lower, &mut posture)?;
    log::info!(
        "IK: {} iterations, residual {:.5}, converged={}, effector {:?}",
        report.iterations,
        report.residual,
        report.converged,
        skeleton.bones()[lower].end_position
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    for kind in IntegratorKind::ALL {
        run_particles(kind);
    }
    run_ik()
}
