use crate::core::cancel::CancelToken;
use crate::core::geometry::{Point, Rect};
use crate::models::ShowState;
use std::sync::Arc;

pub type Pid = u32;

/// Opaque top-level window handle as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// One row of a process-table poll: the process, and its main window when it
/// already has one.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub name: String,
    pub window: Option<WindowHandle>,
}

/// The OS surface the engine runs against. Every call is best-effort and
/// synchronous; a failure is reported as absent data, never as a panic.
pub trait Desktop: Send + Sync {
    /// Enumerates all processes the current user can query. Processes that
    /// exit mid-enumeration or deny access are simply missing from the list.
    fn processes(&self) -> Vec<ProcessSnapshot>;

    /// Raw OS window rect in physical pixels (includes invisible borders on
    /// composited desktops).
    fn window_rect(&self, window: WindowHandle) -> Option<Rect>;

    /// Compositor extended-frame rect in physical pixels, or `None` when
    /// compositing is unavailable.
    fn frame_rect(&self, window: WindowHandle) -> Option<Rect>;

    /// Maps a physical point to logical coordinates using the per-monitor DPI
    /// context of `window`. Identity on failure.
    fn to_logical(&self, window: WindowHandle, point: Point) -> Point;

    fn show_state(&self, window: WindowHandle) -> Option<ShowState>;

    fn move_window(&self, window: WindowHandle, rect: Rect) -> bool;

    fn show_window(&self, window: WindowHandle, state: ShowState) -> bool;

    /// Working area of the monitor currently hosting `window`, in logical
    /// pixels (excludes task bars).
    fn work_area(&self, window: WindowHandle) -> Option<Rect>;
}

pub struct NativeDesktop;

impl Desktop for NativeDesktop {
    fn processes(&self) -> Vec<ProcessSnapshot> {
        imp::processes()
    }

    fn window_rect(&self, window: WindowHandle) -> Option<Rect> {
        imp::window_rect(window)
    }

    fn frame_rect(&self, window: WindowHandle) -> Option<Rect> {
        imp::frame_rect(window)
    }

    fn to_logical(&self, window: WindowHandle, point: Point) -> Point {
        imp::to_logical(window, point)
    }

    fn show_state(&self, window: WindowHandle) -> Option<ShowState> {
        imp::show_state(window)
    }

    fn move_window(&self, window: WindowHandle, rect: Rect) -> bool {
        imp::move_window(window, rect)
    }

    fn show_window(&self, window: WindowHandle, state: ShowState) -> bool {
        imp::show_window(window, state)
    }

    fn work_area(&self, window: WindowHandle) -> Option<Rect> {
        imp::work_area(window)
    }
}

pub fn native() -> Arc<dyn Desktop> {
    Arc::new(NativeDesktop)
}

/// Opts the process into per-monitor (V2) DPI awareness. Without this the OS
/// virtualizes coordinates against the primary monitor's DPI and placements
/// land wrong on mixed-DPI setups. Call once, before any window queries.
pub fn enable_dpi_awareness() {
    imp::enable_dpi_awareness();
}

/// Returns false when another instance already holds the named mutex.
pub fn acquire_single_instance(name: &str) -> bool {
    imp::acquire_single_instance(name)
}

/// Cancels `token` when the console receives Ctrl-C / Ctrl-Break / close.
/// Returns whether a handler was installed.
pub fn install_ctrl_handler(token: CancelToken) -> bool {
    imp::install_ctrl_handler(token)
}

#[cfg(target_os = "windows")]
mod imp {
    use super::{Pid, Point, ProcessSnapshot, Rect, WindowHandle};
    use crate::core::cancel::CancelToken;
    use crate::models::ShowState;
    use once_cell::sync::OnceCell;
    use std::collections::HashMap;
    use std::ffi::{c_void, OsString};
    use std::os::windows::ffi::OsStringExt;
    use windows_sys::Win32::Foundation::{
        CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE, HWND, LPARAM, POINT, RECT,
    };
    use windows_sys::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_EXTENDED_FRAME_BOUNDS};
    use windows_sys::Win32::Graphics::Gdi::{
        GetMonitorInfoW, MonitorFromWindow, MONITORINFO, MONITOR_DEFAULTTONEAREST,
    };
    use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
    use windows_sys::Win32::System::Console::SetConsoleCtrlHandler;
    use windows_sys::Win32::System::ProcessStatus::K32EnumProcesses;
    use windows_sys::Win32::System::Threading::{
        CreateMutexW, OpenProcess, QueryFullProcessImageNameW, PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows_sys::Win32::UI::HiDpi::{
        PhysicalToLogicalPointForPerMonitorDPI, SetProcessDpiAwarenessContext,
        DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindow, GetWindowPlacement, GetWindowRect, GetWindowThreadProcessId,
        IsWindowVisible, MoveWindow, ShowWindow, GW_OWNER, SW_HIDE, SW_SHOWMAXIMIZED,
        SW_SHOWMINIMIZED, SW_SHOWNORMAL, WINDOWPLACEMENT,
    };

    fn to_rect(rect: RECT) -> Rect {
        Rect {
            left: rect.left,
            top: rect.top,
            right: rect.right,
            bottom: rect.bottom,
        }
    }

    pub(super) fn processes() -> Vec<ProcessSnapshot> {
        let windows = main_windows_by_pid();
        let mut snapshots = Vec::new();
        for pid in all_pids() {
            let Some(name) = process_image_name(pid) else {
                continue;
            };
            snapshots.push(ProcessSnapshot {
                pid,
                name,
                window: windows.get(&pid).copied(),
            });
        }
        snapshots
    }

    fn all_pids() -> Vec<Pid> {
        let mut pids = vec![0u32; 1024];
        loop {
            let capacity_bytes = (pids.len() * std::mem::size_of::<u32>()) as u32;
            let mut needed_bytes: u32 = 0;
            let ok = unsafe { K32EnumProcesses(pids.as_mut_ptr(), capacity_bytes, &mut needed_bytes) };
            if ok == 0 {
                return Vec::new();
            }
            if needed_bytes < capacity_bytes {
                pids.truncate(needed_bytes as usize / std::mem::size_of::<u32>());
                return pids;
            }
            // The buffer filled exactly; there may be more processes.
            pids.resize(pids.len() * 2, 0);
        }
    }

    fn process_image_name(pid: Pid) -> Option<String> {
        unsafe {
            let handle: HANDLE = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle == 0 {
                return None;
            }

            let mut buf = vec![0u16; 2048];
            let mut size: u32 = buf.len() as u32;
            let ok = QueryFullProcessImageNameW(handle, 0, buf.as_mut_ptr(), &mut size);
            let _ = CloseHandle(handle);
            if ok == 0 || size == 0 {
                return None;
            }

            buf.truncate(size as usize);
            let path = OsString::from_wide(&buf).to_string_lossy().to_string();
            std::path::Path::new(&path)
                .file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        }
    }

    /// First visible, unowned top-level window per process, which is the same
    /// heuristic the OS shell uses for a process's "main" window.
    fn main_windows_by_pid() -> HashMap<Pid, WindowHandle> {
        unsafe extern "system" fn enum_cb(hwnd: HWND, lparam: LPARAM) -> i32 {
            let map = &mut *(lparam as *mut HashMap<Pid, WindowHandle>);
            if IsWindowVisible(hwnd) == 0 || GetWindow(hwnd, GW_OWNER) != 0 {
                return 1;
            }
            let mut pid: u32 = 0;
            GetWindowThreadProcessId(hwnd, &mut pid);
            if pid != 0 {
                map.entry(pid).or_insert(WindowHandle(hwnd));
            }
            1
        }

        let mut map: HashMap<Pid, WindowHandle> = HashMap::new();
        unsafe {
            let _ = EnumWindows(Some(enum_cb), &mut map as *mut _ as LPARAM);
        }
        map
    }

    pub(super) fn window_rect(window: WindowHandle) -> Option<Rect> {
        let mut rect = RECT {
            left: 0,
            top: 0,
            right: 0,
            bottom: 0,
        };
        let ok = unsafe { GetWindowRect(window.0, &mut rect) };
        (ok != 0).then(|| to_rect(rect))
    }

    pub(super) fn frame_rect(window: WindowHandle) -> Option<Rect> {
        let mut rect = RECT {
            left: 0,
            top: 0,
            right: 0,
            bottom: 0,
        };
        let hr = unsafe {
            DwmGetWindowAttribute(
                window.0,
                DWMWA_EXTENDED_FRAME_BOUNDS,
                &mut rect as *mut RECT as *mut c_void,
                std::mem::size_of::<RECT>() as u32,
            )
        };
        (hr == 0).then(|| to_rect(rect))
    }

    pub(super) fn to_logical(window: WindowHandle, point: Point) -> Point {
        let mut raw = POINT {
            x: point.x,
            y: point.y,
        };
        let ok = unsafe { PhysicalToLogicalPointForPerMonitorDPI(window.0, &mut raw) };
        if ok == 0 {
            return point;
        }
        Point { x: raw.x, y: raw.y }
    }

    pub(super) fn show_state(window: WindowHandle) -> Option<ShowState> {
        let mut placement: WINDOWPLACEMENT = unsafe { std::mem::zeroed() };
        placement.length = std::mem::size_of::<WINDOWPLACEMENT>() as u32;
        let ok = unsafe { GetWindowPlacement(window.0, &mut placement) };
        (ok != 0).then(|| ShowState::from_code(placement.showCmd as u8))
    }

    pub(super) fn move_window(window: WindowHandle, rect: Rect) -> bool {
        let ok = unsafe {
            MoveWindow(
                window.0,
                rect.left,
                rect.top,
                rect.width(),
                rect.height(),
                1,
            )
        };
        ok != 0
    }

    pub(super) fn show_window(window: WindowHandle, state: ShowState) -> bool {
        let cmd = match state {
            ShowState::Hidden => SW_HIDE,
            ShowState::Normal => SW_SHOWNORMAL,
            ShowState::Minimized => SW_SHOWMINIMIZED,
            ShowState::Maximized => SW_SHOWMAXIMIZED,
        };
        let ok = unsafe { ShowWindow(window.0, cmd) };
        ok != 0
    }

    pub(super) fn work_area(window: WindowHandle) -> Option<Rect> {
        unsafe {
            let monitor = MonitorFromWindow(window.0, MONITOR_DEFAULTTONEAREST);
            if monitor == 0 {
                return None;
            }
            let mut info: MONITORINFO = std::mem::zeroed();
            info.cbSize = std::mem::size_of::<MONITORINFO>() as u32;
            if GetMonitorInfoW(monitor, &mut info) == 0 {
                return None;
            }
            let physical = to_rect(info.rcWork);
            // Map the work-area corners through the window's DPI context so
            // centering math stays in the same space as recorded placements.
            let tl = to_logical(window, physical.top_left());
            let br = to_logical(window, physical.bottom_right());
            Some(Rect {
                left: tl.x,
                top: tl.y,
                right: br.x,
                bottom: br.y,
            })
        }
    }

    pub(super) fn enable_dpi_awareness() {
        unsafe {
            let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
        }
    }

    pub(super) fn acquire_single_instance(name: &str) -> bool {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            // The handle is deliberately leaked; the mutex must live as long
            // as the process to keep the instance claim.
            let handle = CreateMutexW(std::ptr::null::<SECURITY_ATTRIBUTES>(), 0, wide.as_ptr());
            if handle == 0 {
                return true;
            }
            GetLastError() != ERROR_ALREADY_EXISTS
        }
    }

    static SHUTDOWN_TOKEN: OnceCell<CancelToken> = OnceCell::new();

    unsafe extern "system" fn on_console_ctrl(_ctrl_type: u32) -> i32 {
        if let Some(token) = SHUTDOWN_TOKEN.get() {
            token.cancel();
        }
        1
    }

    pub(super) fn install_ctrl_handler(token: CancelToken) -> bool {
        if SHUTDOWN_TOKEN.set(token).is_err() {
            return true;
        }
        unsafe { SetConsoleCtrlHandler(Some(on_console_ctrl), 1) != 0 }
    }
}

#[cfg(not(target_os = "windows"))]
mod imp {
    use super::{Point, ProcessSnapshot, Rect, WindowHandle};
    use crate::core::cancel::CancelToken;
    use crate::models::ShowState;

    pub(super) fn processes() -> Vec<ProcessSnapshot> {
        Vec::new()
    }

    pub(super) fn window_rect(_window: WindowHandle) -> Option<Rect> {
        None
    }

    pub(super) fn frame_rect(_window: WindowHandle) -> Option<Rect> {
        None
    }

    pub(super) fn to_logical(_window: WindowHandle, point: Point) -> Point {
        point
    }

    pub(super) fn show_state(_window: WindowHandle) -> Option<ShowState> {
        None
    }

    pub(super) fn move_window(_window: WindowHandle, _rect: Rect) -> bool {
        false
    }

    pub(super) fn show_window(_window: WindowHandle, _state: ShowState) -> bool {
        false
    }

    pub(super) fn work_area(_window: WindowHandle) -> Option<Rect> {
        None
    }

    pub(super) fn enable_dpi_awareness() {}

    pub(super) fn acquire_single_instance(_name: &str) -> bool {
        true
    }

    pub(super) fn install_ctrl_handler(_token: CancelToken) -> bool {
        false
    }
}
