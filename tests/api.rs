mod common;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use appx_unpack::heap::{Heap, SystemHeap};
use appx_unpack::{
    ErrorKind, Package, PackageState, Stream, UnpackPolicy, ValidationPolicy, api,
};
use tempfile::TempDir;

use common::{files_under, package};

#[test]
fn unpack_package_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let source = package(&[("docs/a.txt", b"hello".as_slice())], true).write_to(&tmp.path().join("app.msix"));
    let out = tmp.path().join("out");

    let status = api::unpack_package(
        UnpackPolicy::NONE.with_package_subfolder(),
        ValidationPolicy::Full,
        Some(source.as_path()),
        Some(out.as_path()),
    );
    assert!(status.is_ok(), "{status:?}");
    assert_eq!(files_under(&out), vec!["app/docs/a.txt".to_string()]);
    assert_eq!(fs::read(out.join("app/docs/a.txt")).unwrap(), b"hello");
}

#[test]
fn missing_paths_are_invalid_parameters() {
    let tmp = TempDir::new().unwrap();
    let status = api::unpack_package(UnpackPolicy::NONE, ValidationPolicy::Full, None, Some(tmp.path()));
    assert_eq!(status.kind(), Some(ErrorKind::InvalidParameter));
    let status = api::unpack_package(UnpackPolicy::NONE, ValidationPolicy::Full, Some(tmp.path()), None);
    assert_eq!(status.kind(), Some(ErrorKind::InvalidParameter));
    assert_eq!(status.code(), 0x8007_0057);
}

#[test]
fn failures_map_to_stable_codes() {
    let tmp = TempDir::new().unwrap();
    let unsigned = package(&[("a.txt", b"hello".as_slice())], false).write_to(&tmp.path().join("a.msix"));

    let status = api::unpack_package(
        UnpackPolicy::NONE,
        ValidationPolicy::Full,
        Some(unsigned.as_path()),
        Some(tmp.path().join("out").as_path()),
    );
    assert_eq!(status.code(), 0x8BAD_0041);

    let status = api::unpack_package(
        UnpackPolicy::NONE,
        ValidationPolicy::Full,
        Some(tmp.path().join("missing.msix").as_path()),
        Some(tmp.path().join("out").as_path()),
    );
    assert_eq!(status.kind(), Some(ErrorKind::NotFound));
}

#[test]
fn stream_on_file_modes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data.bin");

    let mut stream = None;
    let status = api::create_stream_on_file(Some(path.as_path()), true, &mut stream);
    assert_eq!(status.kind(), Some(ErrorKind::NotFound));
    assert!(stream.is_none());

    let status = api::create_stream_on_file(Some(path.as_path()), false, &mut stream);
    assert!(status.is_ok());
    let writer = stream.take().unwrap();
    writer.lock().write_all(b"written").unwrap();
    drop(writer);

    let status = api::create_stream_on_file(Some(path.as_path()), true, &mut stream);
    assert!(status.is_ok());
    let reader = stream.unwrap();
    assert_eq!(reader.lock().size().unwrap(), 7);
    assert!(reader.lock().write(b"x").is_err());
}

#[test]
fn factory_drives_a_package_by_hand() {
    let tmp = TempDir::new().unwrap();
    let source = package(&[("a.txt", b"hello".as_slice())], false).write_to(&tmp.path().join("a.msix"));

    let mut factory = None;
    assert!(api::create_factory(None, ValidationPolicy::AllowUnsigned, &mut factory).is_ok());
    let factory = factory.unwrap();
    assert_eq!(factory.lock().policy(), ValidationPolicy::AllowUnsigned);

    let mut stream = None;
    assert!(api::create_stream_on_file(Some(source.as_path()), true, &mut stream).is_ok());
    let reader = factory.lock().create_package_reader(stream.unwrap()).unwrap();
    assert_eq!(reader.ref_count(), 1);

    reader.lock().open().unwrap();
    reader.lock().validate().unwrap();
    let package = reader.query::<dyn Package>().unwrap();
    assert_eq!(reader.ref_count(), 2);
    assert!(reader.same_object(&package));

    let mut storage = None;
    assert!(api::create_directory_storage(Some(tmp.path().join("out").as_path()), &mut storage).is_ok());
    package.lock().unpack(UnpackPolicy::NONE, storage.unwrap()).unwrap();
    assert_eq!(reader.lock().state(), PackageState::Unpacked);

    // A reader is not a stream.
    let err = reader.query::<dyn Stream>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchCapability);
}

#[derive(Default)]
struct CountingHeap {
    allocations: AtomicUsize,
    frees: AtomicUsize,
}

impl Heap for CountingHeap {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        SystemHeap.allocate(len)
    }

    fn free(&self, block: Vec<u8>) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        SystemHeap.free(block);
    }
}

#[test]
fn factory_marshals_through_the_callers_heap() {
    let counting = Arc::new(CountingHeap::default());
    let heap: Arc<dyn Heap> = counting.clone();

    let mut factory = None;
    assert!(api::create_factory(Some(heap), ValidationPolicy::Full, &mut factory).is_ok());
    let text = factory.unwrap().lock().marshal_text("AppxManifest.xml").unwrap();
    assert_eq!(&*text, b"AppxManifest.xml");
    assert_eq!(counting.allocations.load(Ordering::SeqCst), 1);

    drop(text);
    assert_eq!(counting.frees.load(Ordering::SeqCst), 1);
}

struct ExhaustedHeap;

impl Heap for ExhaustedHeap {
    fn allocate(&self, _len: usize) -> Option<Vec<u8>> {
        None
    }

    fn free(&self, _block: Vec<u8>) {}
}

#[test]
fn log_text_guards_its_output() {
    let heap: Arc<dyn Heap> = Arc::new(SystemHeap);
    let mut text = None;
    assert!(api::get_log_text(&heap, &mut text).is_ok());

    let status = api::get_log_text(&heap, &mut text);
    assert_eq!(status.kind(), Some(ErrorKind::InvalidParameter));
    assert!(text.is_some());

    let exhausted: Arc<dyn Heap> = Arc::new(ExhaustedHeap);
    let mut text = None;
    let status = api::get_log_text(&exhausted, &mut text);
    assert_eq!(status.kind(), Some(ErrorKind::OutOfMemory));
    assert!(text.is_none());
}

#[test]
fn directory_storage_needs_a_root() {
    let mut storage = None;
    let status = api::create_directory_storage(None, &mut storage);
    assert_eq!(status.kind(), Some(ErrorKind::InvalidParameter));
}
