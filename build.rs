#[cfg(windows)]
use winres::WindowsResource;

fn main() {
    #[cfg(windows)]
    {
        let mut res = WindowsResource::new();
        res.set("FileDescription", "remote-calls tick driver");
        res.set("ProductName", "remote-calls");
        res.compile().expect("failed to embed Windows resources");
    }
}
