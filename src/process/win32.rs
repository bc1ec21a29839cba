use log::debug;
use std::collections::HashMap;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, TRUE, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible, PostMessageW, WM_CLOSE,
};

struct TopLevelWindow {
    hwnd: HWND,
    pid: u32,
    title: String,
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    TRUE
}

/// Visible top-level windows that have a title
fn titled_windows() -> Vec<TopLevelWindow> {
    let mut handles: Vec<HWND> = Vec::new();
    unsafe {
        if let Err(e) = EnumWindows(
            Some(collect_window),
            LPARAM(&mut handles as *mut Vec<HWND> as isize),
        ) {
            debug!("EnumWindows failed: {}", e);
        }
    }

    handles
        .into_iter()
        .filter_map(|hwnd| unsafe {
            if !IsWindowVisible(hwnd).as_bool() {
                return None;
            }
            let mut buf = [0u16; 512];
            let len = GetWindowTextW(hwnd, &mut buf);
            if len <= 0 {
                return None;
            }
            let mut pid = 0u32;
            GetWindowThreadProcessId(hwnd, Some(&mut pid));
            Some(TopLevelWindow {
                hwnd,
                pid,
                title: String::from_utf16_lossy(&buf[..len as usize]),
            })
        })
        .collect()
}

/// Titles of every visible window per process id, one per line
pub(super) fn window_titles() -> HashMap<u32, String> {
    let mut titles: HashMap<u32, String> = HashMap::new();
    for window in titled_windows() {
        titles
            .entry(window.pid)
            .and_modify(|all| {
                all.push('\n');
                all.push_str(&window.title);
            })
            .or_insert(window.title);
    }
    titles
}

/// Post `WM_CLOSE` to every titled window owned by `pids`
pub(super) fn post_close(pids: &[u32]) -> usize {
    titled_windows()
        .into_iter()
        .filter(|w| pids.contains(&w.pid))
        .filter(|w| unsafe { PostMessageW(w.hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)).is_ok() })
        .count()
}

/// Post `WM_CLOSE` to every titled window whose title contains `text`
/// (case-insensitive)
pub(super) fn post_close_titled(text: &str) -> usize {
    let text = text.to_lowercase();
    titled_windows()
        .into_iter()
        .filter(|w| w.title.to_lowercase().contains(&text))
        .filter(|w| unsafe { PostMessageW(w.hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)).is_ok() })
        .count()
}
