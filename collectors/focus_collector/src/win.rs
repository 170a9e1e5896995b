//! Win32 foreground window inspection.

use timetrack_core::inspect::{FocusInspector, FocusWindow, InspectError};
use windows_sys::Win32::Foundation::HANDLE;

/// Holds the named mutex for the collector's lifetime.
pub struct InstanceGuard(HANDLE);

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        unsafe {
            windows_sys::Win32::Foundation::CloseHandle(self.0);
        }
    }
}

/// Fails when another collector in this session already holds the mutex.
pub fn single_instance() -> anyhow::Result<InstanceGuard> {
    use std::ffi::c_void;
    use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, BOOL, ERROR_ALREADY_EXISTS};

    #[link(name = "kernel32")]
    extern "system" {
        fn CreateMutexW(attrs: *const c_void, initial_owner: BOOL, name: *const u16) -> HANDLE;
    }

    let name: Vec<u16> = "Local\\timetrack.focus_collector"
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();

    unsafe {
        let h = CreateMutexW(std::ptr::null(), 0, name.as_ptr());
        if h.is_null() {
            anyhow::bail!("CreateMutexW failed");
        }
        if GetLastError() == ERROR_ALREADY_EXISTS {
            CloseHandle(h);
            anyhow::bail!("another collector is running");
        }
        Ok(InstanceGuard(h))
    }
}

/// Seconds since the last keyboard or mouse input in this session.
pub fn last_input_idle_seconds() -> Option<u64> {
    use windows_sys::Win32::System::SystemInformation::GetTickCount64;
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO};

    unsafe {
        let mut lii = LASTINPUTINFO {
            cbSize: std::mem::size_of::<LASTINPUTINFO>() as u32,
            dwTime: 0,
        };
        if GetLastInputInfo(&mut lii) == 0 {
            return None;
        }
        // dwTime is a 32-bit tick count and wraps every ~49 days.
        let now = (GetTickCount64() & 0xFFFF_FFFF) as u32;
        Some(u64::from(now.wrapping_sub(lii.dwTime)) / 1000)
    }
}

fn utf16_until(buf: &[u16], len: usize) -> String {
    String::from_utf16_lossy(&buf[..len.min(buf.len())])
}

fn exe_path(pid: u32) -> Option<String> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return None;
        }
        let mut buf = vec![0u16; 1024];
        let mut size = buf.len() as u32;
        let ok = QueryFullProcessImageNameW(handle, 0, buf.as_mut_ptr(), &mut size);
        CloseHandle(handle);
        (ok != 0 && size > 0).then(|| utf16_until(&buf, size as usize))
    }
}

/// Reads the foreground window synchronously; Win32 needs no permission
/// grant, so the only failure is an unreadable process.
fn foreground_window() -> Result<Option<FocusWindow>, InspectError> {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
    };

    let (pid, title) = unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.is_null() {
            return Ok(None);
        }
        let mut pid: u32 = 0;
        GetWindowThreadProcessId(hwnd, &mut pid);

        let len = GetWindowTextLengthW(hwnd);
        let title = if len > 0 {
            let mut buf = vec![0u16; len as usize + 1];
            let read = GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
            utf16_until(&buf, read.max(0) as usize)
        } else {
            String::new()
        };
        (pid, title)
    };

    // pid 0 is the idle process: lock screen or desktop switch.
    if pid == 0 {
        return Ok(None);
    }
    let path = exe_path(pid)
        .ok_or_else(|| InspectError::Transient(format!("cannot read image of pid {pid}")))?;
    let exe = path.rsplit(['\\', '/']).next().unwrap_or(&path).to_string();

    Ok(Some(FocusWindow {
        owner_name: exe,
        bundle_id: None,
        window_title: title,
    }))
}

pub struct WinFocus;

impl FocusInspector for WinFocus {
    async fn inspect_focus(&mut self) -> Result<Option<FocusWindow>, InspectError> {
        foreground_window()
    }
}
