//! 窗口与事件循环
//!
//! 按键：
//! - `V`：切换垂直同步
//! - `F11`：切换无边框全屏
//! - `Esc`：退出

use std::sync::Arc;

use tracing::{error, info};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, WindowBuilder};

use crate::core::error::{FrameSyncError, Result};
use crate::core::Config;
use crate::gfx::dx12::renderer::Renderer;
use crate::renderer::sync::SyncStats;

pub fn run(config: &Config) -> Result<SyncStats> {
    let event_loop = EventLoop::new()
        .map_err(|e| FrameSyncError::Initialization(format!("Failed to create event loop: {}", e)))?;

    let window = WindowBuilder::new()
        .with_title(format!("{} [{}]", config.window.title, config.graphics.backend.name()))
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)
        .map_err(|e| FrameSyncError::Initialization(format!("Failed to create window: {}", e)))?;
    let window = Arc::new(window);

    let mut renderer = Renderer::new(window.clone(), config)?;
    let mut failure: Option<FrameSyncError> = None;

    event_loop
        .run(|event, elwt| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    info!("Close requested");
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    if let Err(e) = renderer.resize(size.width, size.height) {
                        error!("Resize failed: {}", e);
                        failure = Some(e);
                        elwt.exit();
                    }
                }
                WindowEvent::RedrawRequested => {
                    if let Err(e) = renderer.draw() {
                        error!("Frame failed: {}", e);
                        failure = Some(e);
                        elwt.exit();
                    }
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key,
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                    ..
                } => match logical_key.as_ref() {
                    Key::Character("v") | Key::Character("V") => renderer.toggle_vsync(),
                    Key::Named(NamedKey::F11) => {
                        let window = renderer.window();
                        if window.fullscreen().is_some() {
                            window.set_fullscreen(None);
                        } else {
                            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                        }
                    }
                    Key::Named(NamedKey::Escape) => elwt.exit(),
                    _ => {}
                },
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        })
        .map_err(|e| FrameSyncError::Initialization(format!("Event loop error: {}", e)))?;

    if let Some(e) = failure {
        return Err(e);
    }
    renderer.shutdown()
}
