use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin, EguiPrimaryContextPass};
use droneharvest::*;
use droneharvest::Command;

// ---------- Constants ----------
const PIXELS_PER_UNIT: f32 = 16.0;
const DRONE_SIZE: f32 = 10.0;
const BASE_SIZE: f32 = 40.0;
const RESOURCE_SIZE: f32 = 8.0;
const MAX_STEPS_PER_FRAME: u32 = 8;
const SPEED_RANGE: std::ops::RangeInclusive<f32> = 1.0..=15.0;

// ---------- Components ----------
#[derive(Component)]
struct DroneSprite(DroneId);

#[derive(Component)]
struct ResourceSprite(ResourceId);

#[derive(Component)]
struct SceneLayer; // Static geometry: obstacles and bases

// ---------- Resources ----------
#[derive(Resource)]
struct UiState {
	paused: bool,
	speed: f32,
	drones_per_faction: usize,
	spawn_rate_input: String,
	log: Vec<String>,
	toast: Option<(String, f32)>, // (message, remaining_seconds)
}

impl UiState {
	fn for_engine(engine: &Engine) -> Self {
		let config = engine.config();
		Self {
			paused: false,
			speed: config.motion.speed,
			drones_per_faction: config.drones_per_faction,
			spawn_rate_input: config.spawner.spawns_per_second.to_string(),
			log: vec!["Harvest session started".to_string()],
			toast: None,
		}
	}
}

#[derive(Resource)]
struct GameEngine {
	engine: Engine,
}

#[derive(Resource, Default)]
struct SimClock {
	accumulator: f32,
}

// ---------- Entry ----------
fn main() {
	let (config, load_error) = load_config();
	let engine = match Engine::from_config(config) {
		Ok(engine) => engine,
		Err(err) => {
			eprintln!("Failed to start session: {err}");
			std::process::exit(1);
		}
	};
	let mut ui = UiState::for_engine(&engine);
	if let Some(msg) = load_error {
		ui.toast = Some((msg, 5.0));
	}

	App::new()
		.add_plugins(DefaultPlugins.set(WindowPlugin {
			primary_window: Some(Window {
				title: "Droneharvest".to_string(),
				resolution: (1280, 800).into(),
				..Default::default()
			}),
			..Default::default()
		}))
		.add_plugins(EguiPlugin::default())
		// Resources
		.insert_resource(ui)
		.insert_resource(GameEngine { engine })
		.insert_resource(SimClock::default())
		// Setup
		.add_systems(Startup, (setup_camera, spawn_scene))
		// Frame systems
		.add_systems(
			Update,
			(
				handle_pan_zoom,
				tick_engine_when_running,
				sync_drone_sprites,
				sync_resource_sprites,
				draw_paths,
				update_toast_timer,
			)
				.chain(),
		)
		.add_systems(EguiPrimaryContextPass, draw_ui)
		.run();
}

/// Reads a JSON config from the first argument if one is given; on failure the
/// defaults are used and the error is surfaced in the UI.
fn load_config() -> (SimConfig, Option<String>) {
	let Some(path) = std::env::args().nth(1) else {
		return (SimConfig::default(), None);
	};
	let parsed = std::fs::read_to_string(&path)
		.map_err(|e| e.to_string())
		.and_then(|text| SimConfig::from_json_str(&text).map_err(|e| e.to_string()));
	match parsed {
		Ok(config) => (config, None),
		Err(e) => (SimConfig::default(), Some(format!("Could not load {path}: {e}"))),
	}
}

// ---------- Setup ----------
fn setup_camera(mut commands: Commands) {
	commands.spawn((Camera2d, Transform::from_xyz(0.0, 0.0, 1000.0)));
}

fn spawn_scene(mut commands: Commands, eng: Res<GameEngine>) {
	for obstacle in eng.engine.world.obstacles() {
		let (center, size) = match *obstacle {
			Obstacle::Sphere { center, radius } => (center, Vec2::splat(radius * 2.0)),
			Obstacle::Cuboid { min, max } => ((min + max) * 0.5, Vec2::new(max.x - min.x, max.z - min.z)),
		};
		commands.spawn((
			Sprite::from_color(Color::srgb(0.2, 0.2, 0.24), size * PIXELS_PER_UNIT),
			Transform::from_translation(to_screen(center).extend(0.0)),
			SceneLayer,
		));
	}
	for base in &eng.engine.bases {
		commands.spawn((
			Sprite::from_color(faction_color(base.faction).with_alpha(0.35), Vec2::splat(BASE_SIZE)),
			Transform::from_translation(to_screen(base.position).extend(1.0)),
			SceneLayer,
		));
	}
	for drone in &eng.engine.drones {
		commands.spawn((
			Sprite::from_color(faction_color(drone.faction), Vec2::splat(DRONE_SIZE)),
			Transform::from_translation(to_screen(drone.position).extend(3.0)),
			visibility_for(drone.is_active()),
			DroneSprite(drone.id),
		));
	}
}

// ---------- Utilities ----------
// Top-down view: world x/z map to screen x/y.
fn to_screen(p: Point3) -> Vec2 {
	Vec2::new(p.x, p.z) * PIXELS_PER_UNIT
}

fn faction_color(f: FactionId) -> Color {
	match f {
		FactionId::RED => Color::srgb(0.9, 0.25, 0.2),
		FactionId::BLUE => Color::srgb(0.25, 0.45, 0.95),
		_ => Color::srgb(0.7, 0.7, 0.7),
	}
}

fn visibility_for(active: bool) -> Visibility {
	if active { Visibility::Visible } else { Visibility::Hidden }
}

fn set_toast(ui: &mut UiState, msg: impl Into<String>) {
	ui.toast = Some((msg.into(), 2.0));
}

/// Applies a control-panel command; a rejected one ends up in the toast.
fn apply_command(engine: &mut Engine, ui: &mut UiState, command: Command) {
	if let Err(e) = engine.apply(command) {
		set_toast(ui, e.to_string());
	}
}

/// Accepts both `0.5` and `0,5`.
fn parse_rate(input: &str) -> Option<f32> {
	input.trim().replace(',', ".").parse().ok()
}

// ---------- Systems: Camera Pan/Zoom ----------
fn handle_pan_zoom(
	motion: Res<AccumulatedMouseMotion>,
	scroll: Res<AccumulatedMouseScroll>,
	mouse_buttons: Res<ButtonInput<MouseButton>>,
	mut q_cam: Query<(&mut Projection, &mut Transform), With<Camera>>,
) {
	let (mut proj, mut cam_transform) = if let Ok(v) = q_cam.single_mut() { v } else { return };

	if mouse_buttons.pressed(MouseButton::Middle) {
		// Pan opposite of mouse drag direction (screen to world)
		cam_transform.translation.x -= motion.delta.x;
		cam_transform.translation.y += motion.delta.y;
	}

	if scroll.delta.y != 0.0 {
		let factor = 1.0 - scroll.delta.y * 0.1;
		if let Projection::Orthographic(ortho) = &mut *proj {
			ortho.scale = (ortho.scale * factor).clamp(0.2, 10.0);
		}
	}
}

// ---------- Systems: Engine ----------
fn tick_engine_when_running(
	time: Res<Time>,
	mut clock: ResMut<SimClock>,
	mut eng: ResMut<GameEngine>,
	mut ui: ResMut<UiState>,
) {
	if ui.paused {
		return;
	}
	let dt = eng.engine.config().tick_seconds;
	clock.accumulator += time.delta_secs();
	let mut steps = 0;
	while clock.accumulator >= dt && steps < MAX_STEPS_PER_FRAME {
		let report = eng.engine.tick();
		for d in &report.deliveries {
			ui.log.push(format!("{} delivered {}", d.faction.name(), d.amount));
		}
		clock.accumulator -= dt;
		steps += 1;
	}
	// Drop backlog we could not catch up on.
	if steps == MAX_STEPS_PER_FRAME {
		clock.accumulator = 0.0;
	}
	let overflow = ui.log.len().saturating_sub(50);
	ui.log.drain(..overflow);
}

// ---------- Systems: Rendering ----------
fn sync_drone_sprites(eng: Res<GameEngine>, mut q: Query<(&DroneSprite, &mut Transform, &mut Visibility, &mut Sprite)>) {
	for (tag, mut transform, mut visibility, mut sprite) in &mut q {
		let Some(drone) = eng.engine.drone(tag.0) else { continue };
		let p = to_screen(drone.position);
		transform.translation.x = p.x;
		transform.translation.y = p.y;
		*visibility = visibility_for(drone.is_active());
		let color = faction_color(drone.faction);
		sprite.color = if drone.is_carrying() { color.mix(&Color::WHITE, 0.5) } else { color };
	}
}

fn sync_resource_sprites(
	mut commands: Commands,
	eng: Res<GameEngine>,
	mut q: Query<(Entity, &ResourceSprite, &mut Sprite)>,
) {
	let resources = &eng.engine.resources;
	let mut shown = Vec::new();
	for (entity, tag, mut sprite) in &mut q {
		match resources.get(tag.0) {
			Some(r) => {
				sprite.color = resource_color(r.claim.is_claimed());
				shown.push(tag.0);
			}
			None => commands.entity(entity).despawn(),
		}
	}
	for r in resources.iter().filter(|r| !shown.contains(&r.id)) {
		commands.spawn((
			Sprite::from_color(resource_color(r.claim.is_claimed()), Vec2::splat(RESOURCE_SIZE)),
			Transform::from_translation(to_screen(r.position).extend(2.0)),
			ResourceSprite(r.id),
		));
	}
}

fn resource_color(claimed: bool) -> Color {
	if claimed { Color::srgb(0.85, 0.75, 0.2) } else { Color::srgb(0.3, 0.85, 0.4) }
}

fn draw_paths(eng: Res<GameEngine>, mut gizmos: Gizmos) {
	if !eng.engine.show_paths() {
		return;
	}
	for drone in eng.engine.drones.iter().filter(|d| d.is_active() && d.motion.is_moving()) {
		let Some(path) = drone.motion.path() else { continue };
		let remaining = path.waypoints().iter().skip(drone.motion.path_index()).map(|p| to_screen(*p));
		let points: Vec<Vec2> = std::iter::once(to_screen(drone.position)).chain(remaining).collect();
		gizmos.linestrip_2d(points, faction_color(drone.faction).with_alpha(0.6));
	}
}

// ---------- Systems: Toast ----------
fn update_toast_timer(time: Res<Time>, mut ui: ResMut<UiState>) {
	if let Some((_, ref mut remaining)) = ui.toast {
		*remaining -= time.delta_secs();
		if *remaining <= 0.0 {
			ui.toast = None;
		}
	}
}

// ---------- Systems: UI ----------
fn draw_ui(mut egui_ctx: EguiContexts, mut ui: ResMut<UiState>, mut eng: ResMut<GameEngine>) {
	let Ok(ctx) = egui_ctx.ctx_mut() else { return };

	// Top HUD
	egui::TopBottomPanel::top("top_hud").show(&*ctx, |ui_top| {
		ui_top.horizontal(|ui_row| {
			let hud_text = format_hud(&eng.engine.scores(), eng.engine.resources.len());
			ui_row.label(hud_text);
			ui_row.separator();
			ui_row.label(format!("t = {:.0}s", eng.engine.elapsed()));
			let pause_label = if ui.paused { "Resume" } else { "Pause" };
			if ui_row.button(pause_label).clicked() {
				ui.paused = !ui.paused;
			}
			if let Some((ref msg, _)) = ui.toast {
				ui_row.separator();
				ui_row.colored_label(egui::Color32::YELLOW, msg);
			}
		});
	});

	// Right panel (controls / roster)
	egui::SidePanel::right("right_panel")
		.resizable(true)
		.default_width(300.0)
		.show(&*ctx, |ui_right| {
			ui_right.heading("Controls");

			let mut speed = ui.speed;
			if ui_right.add(egui::Slider::new(&mut speed, SPEED_RANGE).text("Drone speed")).changed() {
				ui.speed = speed;
				apply_command(&mut eng.engine, &mut ui, Command::SetDroneSpeed(speed));
			}

			let max = eng.engine.config().max_drones_per_faction;
			let mut count = ui.drones_per_faction;
			if ui_right.add(egui::Slider::new(&mut count, 0..=max).text("Drones per faction")).changed() {
				ui.drones_per_faction = count;
				apply_command(&mut eng.engine, &mut ui, Command::SetActiveDronesPerFaction(count));
			}

			ui_right.horizontal(|ui_row| {
				ui_row.label("Spawns / s");
				let response = ui_row.text_edit_singleline(&mut ui.spawn_rate_input);
				let enter_pressed = response.lost_focus() && response.ctx.input(|i| i.key_pressed(egui::Key::Enter));
				if ui_row.button("Apply").clicked() || enter_pressed {
					let outcome = match parse_rate(&ui.spawn_rate_input) {
						Some(rate) => eng.engine.apply(Command::SetSpawnRate(rate)).map_err(|e| e.to_string()),
						None => Err(format!("'{}' is not a number", ui.spawn_rate_input.trim())),
					};
					if let Err(msg) = outcome {
						set_toast(&mut ui, msg);
					}
				}
			});

			let mut show_paths = eng.engine.show_paths();
			if ui_right.checkbox(&mut show_paths, "Show paths").changed() {
				apply_command(&mut eng.engine, &mut ui, Command::SetPathVisible(show_paths));
			}

			ui_right.separator();
			egui::ScrollArea::vertical().max_height(360.0).show(ui_right, |ui_scroll| {
				for line in format_side_panel(&eng.engine.drones) {
					ui_scroll.label(line);
				}
			});

			ui_right.separator();
			ui_right.heading("Log");
			egui::ScrollArea::vertical().stick_to_bottom(true).show(ui_right, |ui_logs| {
				for line in &ui.log {
					ui_logs.label(line);
				}
			});
		});
}

#[cfg(test)]
mod tests {
	use super::*;
	use bevy::prelude::{MinimalPlugins, TransformPlugin};

	fn test_engine() -> Engine {
		let mut config = SimConfig { drones_per_faction: 1, max_drones_per_faction: 2, ..SimConfig::default() };
		config.obstacles.count = 3;
		config.planner.grid = GridConfig { cell_size: 1.0, extent: Point3::new(40.0, 0.0, 40.0) };
		Engine::from_config(config).expect("engine")
	}

	#[test]
	fn scene_spawns_sprites_for_engine_state() {
		let mut app = App::new();
		app.add_plugins((MinimalPlugins, TransformPlugin));

		let mut engine = test_engine();
		engine.resources.spawn(Point3::new(0.0, 0.0, 5.0));
		app.insert_resource(UiState::for_engine(&engine));
		app.insert_resource(GameEngine { engine });
		app.add_systems(Startup, (setup_camera, spawn_scene));
		app.add_systems(Update, (sync_drone_sprites, sync_resource_sprites).chain());

		app.update();
		app.update();

		let world = app.world_mut();
		let drones = world.query::<&DroneSprite>().iter(world).count();
		let resources = world.query::<&ResourceSprite>().iter(world).count();
		let hidden = world
			.query::<(&DroneSprite, &Visibility)>()
			.iter(world)
			.filter(|(_, v)| **v == Visibility::Hidden)
			.count();
		assert_eq!(drones, 4);
		assert_eq!(hidden, 2);
		assert_eq!(resources, 1);
	}

	#[test]
	fn resource_sprites_follow_removal() {
		let mut app = App::new();
		app.add_plugins((MinimalPlugins, TransformPlugin));

		let mut engine = test_engine();
		let id = engine.resources.spawn(Point3::new(0.0, 0.0, 5.0));
		app.insert_resource(GameEngine { engine });
		app.add_systems(Update, sync_resource_sprites);

		app.update();
		app.world_mut().resource_mut::<GameEngine>().engine.resources.remove(id);
		app.update();

		let world = app.world_mut();
		assert_eq!(world.query::<&ResourceSprite>().iter(world).count(), 0);
	}

	#[test]
	fn control_commands_report_rejections() {
		let mut engine = test_engine();
		let mut ui = UiState::for_engine(&engine);

		apply_command(&mut engine, &mut ui, Command::SetPathVisible(false));
		assert!(!engine.show_paths());
		assert!(ui.toast.is_none());

		apply_command(&mut engine, &mut ui, Command::SetDroneSpeed(-1.0));
		let toast = ui.toast.as_ref().map(|(msg, _)| msg.as_str());
		assert_eq!(toast, Some("Drone speed must be positive, got -1"));
	}

	#[test]
	fn spawn_rate_accepts_comma_decimal() {
		assert_eq!(parse_rate("0,5"), Some(0.5));
		assert_eq!(parse_rate(" 2 "), Some(2.0));
		assert_eq!(parse_rate("fast"), None);
	}
}
