//! Windows capture and injection glue.
//!
//! A hidden message-only window registered for raw mouse input supplies
//! relative deltas and button masks; a low-level keyboard hook supplies key
//! transitions and turns the reserved hotkeys into triggers; SendInput
//! synthesizes playback.

use crossbeam_channel::Sender;
use ditto_core::{Button, CaptureEvent, Error, ReservedKeys, Trigger};
use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::time::Instant;
use tracing::{error, warn};

use windows::core::w;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::{
    GetRawInputData, RegisterRawInputDevices, HRAWINPUT, RAWINPUT, RAWINPUTDEVICE,
    RAWINPUTHEADER, RIDEV_INPUTSINK, RID_INPUT, RIM_TYPEMOUSE,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN,
    MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP,
    MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW,
    GetMessageW, PostThreadMessageW, RegisterClassW, SetWindowsHookExW, TranslateMessage,
    UnhookWindowsHookEx, UnregisterClassW, HHOOK, HWND_MESSAGE, KBDLLHOOKSTRUCT, MSG,
    WH_KEYBOARD_LL, WINDOW_EX_STYLE, WINDOW_STYLE, WM_INPUT, WM_KEYDOWN, WM_KEYUP, WM_QUIT,
    WM_SYSKEYDOWN, WM_SYSKEYUP, WNDCLASSW,
};

/// Virtual key codes for the default hotkeys.
pub mod vk {
    pub const F9: u32 = 0x78;
    pub const F10: u32 = 0x79;
    pub const F12: u32 = 0x7b;
}

const HID_USAGE_PAGE_GENERIC: u16 = 0x01;
const HID_USAGE_GENERIC_MOUSE: u16 = 0x02;

const CLASS_NAME: PCWSTR = w!("DittoRawInputWindow");

/// State shared with the window proc and the keyboard hook. Published
/// through [`PUMP_STATE`] because neither callback carries user data.
struct PumpState {
    on_capture: Box<dyn Fn(Instant, CaptureEvent) + Send + Sync>,
    triggers: Sender<Trigger>,
    reserved: ReservedKeys,
    // one held flag per reserved key, so key auto-repeat fires no
    // second trigger for the same physical press
    held: [AtomicBool; 3],
}

impl PumpState {
    fn forward_trigger(&self, code: u32, down: bool) {
        let (trigger, slot) = if code == self.reserved.toggle_record {
            (Trigger::ToggleRecord, 0)
        } else if code == self.reserved.start_play {
            (Trigger::StartPlay, 1)
        } else if code == self.reserved.stop_play {
            (Trigger::StopPlay, 2)
        } else {
            return;
        };

        if down {
            if !self.held[slot].swap(true, Ordering::SeqCst) {
                let _ = self.triggers.send(trigger);
            }
        } else {
            self.held[slot].store(false, Ordering::SeqCst);
        }
    }
}

static PUMP_STATE: AtomicPtr<PumpState> = AtomicPtr::new(ptr::null_mut());

fn pump_state() -> Option<&'static PumpState> {
    let p = PUMP_STATE.load(Ordering::Acquire);
    if p.is_null() {
        None
    } else {
        Some(unsafe { &*p })
    }
}

/// Owns the hidden window, the raw-input registration and the keyboard
/// hook for this process. Everything is released on drop.
///
/// Create and run it on the thread that will pump messages; the type is
/// deliberately `!Send` because the window and the hook belong to that
/// thread.
pub struct MessagePump {
    hook: HHOOK,
    hwnd: HWND,
    thread_id: u32,
    _not_send: PhantomData<*const ()>,
}

impl MessagePump {
    /// Register the capture window and the keyboard hook. Only one pump
    /// may exist per process at a time.
    pub fn new(
        reserved: ReservedKeys,
        on_capture: impl Fn(Instant, CaptureEvent) + Send + Sync + 'static,
        triggers: Sender<Trigger>,
    ) -> anyhow::Result<Self> {
        let state = Box::into_raw(Box::new(PumpState {
            on_capture: Box::new(on_capture),
            triggers,
            reserved,
            held: [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)],
        }));
        if PUMP_STATE
            .compare_exchange(ptr::null_mut(), state, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            drop(unsafe { Box::from_raw(state) });
            anyhow::bail!("an input message pump is already running in this process");
        }

        let result = unsafe { Self::install() };
        if result.is_err() {
            let prev = PUMP_STATE.swap(ptr::null_mut(), Ordering::AcqRel);
            drop(unsafe { Box::from_raw(prev) });
        }
        result
    }

    unsafe fn install() -> anyhow::Result<Self> {
        let instance: HINSTANCE = GetModuleHandleW(None)?.into();

        let class = WNDCLASSW {
            lpfnWndProc: Some(wndproc),
            hInstance: instance,
            lpszClassName: CLASS_NAME,
            ..Default::default()
        };
        if RegisterClassW(&class) == 0 {
            anyhow::bail!("failed to register the capture window class");
        }

        let hwnd = CreateWindowExW(
            WINDOW_EX_STYLE(0),
            CLASS_NAME,
            w!("ditto raw input"),
            WINDOW_STYLE(0),
            0,
            0,
            0,
            0,
            Some(HWND_MESSAGE),
            None,
            Some(instance),
            None,
        )?;

        let device = RAWINPUTDEVICE {
            usUsagePage: HID_USAGE_PAGE_GENERIC,
            usUsage: HID_USAGE_GENERIC_MOUSE,
            dwFlags: RIDEV_INPUTSINK,
            hwndTarget: hwnd,
        };
        RegisterRawInputDevices(&[device], mem::size_of::<RAWINPUTDEVICE>() as u32)?;

        let hook = SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), Some(instance), 0)?;

        Ok(Self {
            hook,
            hwnd,
            thread_id: GetCurrentThreadId(),
            _not_send: PhantomData,
        })
    }

    /// The pump thread's id, for [`post_quit`] from other threads.
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Run the message loop until a quit message arrives.
    pub fn run(&self) {
        let mut msg = MSG::default();
        loop {
            let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match ret.0 {
                0 => break,
                -1 => {
                    error!("message loop failed: {:?}", windows::core::Error::from_win32());
                    break;
                }
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
    }
}

impl Drop for MessagePump {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = UnhookWindowsHookEx(self.hook) {
                warn!("failed to remove keyboard hook: {e}");
            }
            if let Err(e) = DestroyWindow(self.hwnd) {
                warn!("failed to destroy capture window: {e}");
            }
            let instance: HINSTANCE = GetModuleHandleW(None).map(Into::into).unwrap_or_default();
            let _ = UnregisterClassW(CLASS_NAME, Some(instance));

            // callbacks are gone; reclaim the shared state
            let state = PUMP_STATE.swap(ptr::null_mut(), Ordering::AcqRel);
            if !state.is_null() {
                drop(Box::from_raw(state));
            }
        }
    }
}

/// Ask the pump thread to leave its message loop.
pub fn post_quit(thread_id: u32) {
    unsafe {
        if let Err(e) = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
            warn!("failed to post quit message: {e}");
        }
    }
}

unsafe extern "system" fn wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_INPUT {
        if let Some(state) = pump_state() {
            handle_raw_input(state, lparam);
        }
        return LRESULT(0);
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

unsafe fn handle_raw_input(state: &PumpState, lparam: LPARAM) {
    let header_size = mem::size_of::<RAWINPUTHEADER>() as u32;
    let mut size = 0u32;
    GetRawInputData(
        HRAWINPUT(lparam.0 as *mut c_void),
        RID_INPUT,
        None,
        &mut size,
        header_size,
    );
    if size == 0 || size as usize > mem::size_of::<RAWINPUT>() {
        return;
    }

    let mut raw: RAWINPUT = mem::zeroed();
    let got = GetRawInputData(
        HRAWINPUT(lparam.0 as *mut c_void),
        RID_INPUT,
        Some(&mut raw as *mut RAWINPUT as *mut c_void),
        &mut size,
        header_size,
    );
    if got != size || raw.header.dwType != RIM_TYPEMOUSE.0 {
        return;
    }

    let at = Instant::now();
    let mouse = raw.data.mouse;
    let (dx, dy) = (mouse.lLastX, mouse.lLastY);
    if dx != 0 || dy != 0 {
        (state.on_capture)(at, CaptureEvent::Motion { dx, dy });
    }
    let mask = mouse.Anonymous.Anonymous.usButtonFlags as u32;
    if mask != 0 {
        (state.on_capture)(at, CaptureEvent::Buttons { mask });
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        if let Some(state) = pump_state() {
            let kb = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
            let msg = wparam.0 as u32;
            let down = msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN;
            let up = msg == WM_KEYUP || msg == WM_SYSKEYUP;
            if down || up {
                (state.on_capture)(Instant::now(), CaptureEvent::Key {
                    code: kb.vkCode,
                    down,
                });
                state.forward_trigger(kb.vkCode, down);
            }
        }
    }
    CallNextHookEx(None, code, wparam, lparam)
}

/// Injects synthesized input through SendInput.
pub struct SendInputInjector;

impl ditto_core::Injector for SendInputInjector {
    fn move_relative(&self, dx: i32, dy: i32) -> ditto_core::Result<()> {
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    mouseData: 0,
                    dwFlags: MOUSEEVENTF_MOVE,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        send_inputs(&[input])
    }

    fn button(&self, button: Button, down: bool) -> ditto_core::Result<()> {
        let flags = match (button, down) {
            (Button::Left, true) => MOUSEEVENTF_LEFTDOWN,
            (Button::Left, false) => MOUSEEVENTF_LEFTUP,
            (Button::Right, true) => MOUSEEVENTF_RIGHTDOWN,
            (Button::Right, false) => MOUSEEVENTF_RIGHTUP,
            (Button::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
            (Button::Middle, false) => MOUSEEVENTF_MIDDLEUP,
        };
        send_inputs(&[make_mouse_input(flags)])
    }

    fn key(&self, code: u32, down: bool) -> ditto_core::Result<()> {
        send_inputs(&[make_key_input(code as u16, !down)])
    }
}

fn make_mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn make_key_input(vk: u16, key_up: bool) -> INPUT {
    let flags = if key_up {
        KEYEVENTF_KEYUP
    } else {
        KEYBD_EVENT_FLAGS(0)
    };

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send_inputs(inputs: &[INPUT]) -> ditto_core::Result<()> {
    let sent = unsafe { SendInput(inputs, mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(Error::Injection(format!(
            "SendInput sent {sent} of {}",
            inputs.len()
        )));
    }
    Ok(())
}
