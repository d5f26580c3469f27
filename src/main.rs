mod garage;
mod input;
mod logger;
mod time;
mod widgets;

use std::{cell::RefCell, io, rc::Rc};

use ratzilla::event::{KeyCode, MouseButton, MouseEventKind};
use ratzilla::ratatui::Terminal;
use ratzilla::{DomBackend, WebRenderer};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

use garage::clock::SystemClock;
use garage::config::{EngineConfig, CONFIG_STORAGE_KEY};
use garage::engine::{Engine, LiveSession};
use garage::rng::PcgRoll;
use garage::save::SaveStore;
use garage::GarageGame;
use input::{pixel_x_to_col, pixel_y_to_row, ClickState, InputEvent};

/// Map a pointer position to a terminal cell using the grid container's rect.
fn dom_pixel_to_cell(mouse_x: u32, mouse_y: u32, cs: &ClickState) -> Option<(u16, u16)> {
    let window = web_sys::window()?;
    let document = window.document()?;

    // DomBackend renders its grid into a <div> directly under <body>.
    let grid = document.query_selector("body > div").ok()??;
    let rect = grid.get_bounding_client_rect();

    let col = pixel_x_to_col(mouse_x as f64 - rect.left(), rect.width(), cs.terminal_cols)?;
    let row = pixel_y_to_row(mouse_y as f64 - rect.top(), rect.height(), cs.terminal_rows)?;
    Some((col, row))
}

/// Engine config, with an optional JSON override from localStorage.
fn load_config() -> EngineConfig {
    let raw = web_sys::window()
        .and_then(|w| w.local_storage().ok().flatten())
        .and_then(|s| s.get_item(CONFIG_STORAGE_KEY).ok().flatten());
    match raw {
        Some(json) => EngineConfig::from_json(&json).unwrap_or_else(|e| {
            log::warn!("設定の上書きを無視: {e}");
            EngineConfig::default()
        }),
        None => EngineConfig::default(),
    }
}

#[cfg(target_arch = "wasm32")]
fn save_store() -> Box<dyn SaveStore> {
    Box::new(garage::save::LocalStore)
}

#[cfg(not(target_arch = "wasm32"))]
fn save_store() -> Box<dyn SaveStore> {
    Box::new(garage::save::MemoryStore::new())
}

/// Flush the save when the page goes away.
fn install_unload_save(engine: &Rc<RefCell<Engine>>) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let engine = Rc::clone(engine);
    let on_hide = Closure::<dyn FnMut()>::new(move || {
        if let Ok(mut engine) = engine.try_borrow_mut() {
            engine.force_save();
        }
    });
    for event in ["pagehide", "beforeunload"] {
        if let Err(e) =
            window.add_event_listener_with_callback(event, on_hide.as_ref().unchecked_ref())
        {
            log::warn!("{event} リスナーの登録に失敗: {e:?}");
        }
    }
    // The listener lives for the lifetime of the page.
    on_hide.forget();
}

fn main() -> io::Result<()> {
    console_error_panic_hook::set_once();
    logger::init(log::LevelFilter::Info);

    let engine = Rc::new(RefCell::new(Engine::load_or_new(
        load_config(),
        save_store(),
        Box::new(SystemClock),
        Box::new(PcgRoll::from_entropy()),
    )));
    let session = LiveSession::begin(&engine, js_sys::Date::now());
    install_unload_save(&engine);

    let game = Rc::new(RefCell::new(GarageGame::new(Rc::clone(&engine))));
    let click_state = Rc::new(RefCell::new(ClickState::new()));
    let backend = DomBackend::new()?;
    let terminal = Terminal::new(backend)?;

    terminal.on_mouse_event({
        let game = game.clone();
        let click_state = click_state.clone();
        move |mouse_event| {
            if mouse_event.event != MouseEventKind::Pressed
                || mouse_event.button != MouseButton::Left
            {
                return;
            }

            let action = {
                let cs = click_state.borrow();
                if cs.terminal_rows == 0 || cs.terminal_cols == 0 {
                    return;
                }
                dom_pixel_to_cell(mouse_event.x, mouse_event.y, &cs)
                    .and_then(|(col, row)| cs.hit_test(col, row))
            };

            if let Some(action_id) = action {
                game.borrow_mut()
                    .handle_input(&InputEvent::Click(action_id));
            }
        }
    });

    terminal.on_key_event({
        let game = game.clone();
        move |key_event| {
            let event = match key_event.code {
                KeyCode::Char(c) => InputEvent::Key(c),
                KeyCode::Enter | KeyCode::Esc => InputEvent::Key(' '),
                _ => return,
            };
            game.borrow_mut().handle_input(&event);
        }
    });

    terminal.draw_web({
        let click_state = click_state.clone();
        move |f| {
            // Owned by the frame loop: the session runs for as long as the page draws.
            let _session = &session;

            let mut game = game.borrow_mut();
            game.pump(js_sys::Date::now());

            let size = f.area();
            {
                let mut cs = click_state.borrow_mut();
                cs.terminal_cols = size.width;
                cs.terminal_rows = size.height;
                cs.clear_targets();
            }

            game.render(f, size, &click_state);
        }
    });

    Ok(())
}
