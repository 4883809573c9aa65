use anyhow::Result;
use shrike::module::ScriptRegistry;
use shrike::script::{Script, ScriptContext};

/// Integrates `Velocity` into `Transform` every frame.
#[derive(Default)]
struct Mover;

impl Script for Mover {
    fn on_init(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
        ctx.log("mover attached");
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut ScriptContext<'_>, dt: f32) -> Result<()> {
        let transform = ctx.component("Transform")?;
        let velocity = ctx.component("Velocity")?;
        let x = transform.get_f32("x")? + velocity.get_f32("vx")? * dt;
        let y = transform.get_f32("y")? + velocity.get_f32("vy")? * dt;
        transform.set_f32("x", x)?;
        transform.set_f32("y", y)?;
        Ok(())
    }

    fn on_destroy(&mut self, ctx: &mut ScriptContext<'_>) -> Result<()> {
        ctx.log("mover retired");
        Ok(())
    }
}

pub fn register(registry: &mut ScriptRegistry) {
    registry.register::<Mover>("Mover");
}
