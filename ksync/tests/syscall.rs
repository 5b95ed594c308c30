use kcore::{KernelError, SystemConfiguration, fs::ramfs::RamFs, thread::ThreadBuilder};
use ksync::{FileDescriptor, Process, Syscall};
use std::sync::Arc;

const O_RDONLY: u32 = 0;
const O_WRONLY: u32 = 1;
const O_RDWR: u32 = 2;
const O_CREAT: u32 = 0o4;

fn process() -> Process {
    Process::new(RamFs::new().root(), SystemConfiguration::default())
}

fn create(process: &Process, path: &str, contents: &[u8]) {
    let fd = process.syscall(Syscall::Open {
        path,
        flags: O_WRONLY | O_CREAT,
        mode: 0o644,
    });
    let fd = FileDescriptor(fd as i32);
    assert_eq!(
        process.syscall(Syscall::Write { fd, buf: contents }),
        contents.len()
    );
    assert_eq!(process.syscall(Syscall::Close { fd }), 0);
}

fn read_all(process: &Process, path: &str) -> Vec<u8> {
    let fd = process.syscall(Syscall::Open {
        path,
        flags: O_RDONLY,
        mode: 0,
    });
    let fd = FileDescriptor(fd as i32);
    let mut contents = Vec::new();
    let mut buf = [0; 5];
    loop {
        match process.syscall(Syscall::Read { fd, buf: &mut buf }) {
            0 => break,
            n => contents.extend_from_slice(&buf[..n]),
        }
    }
    assert_eq!(process.syscall(Syscall::Close { fd }), 0);
    contents
}

#[test]
fn results_are_encoded() {
    let process = process();
    assert_eq!(
        process.syscall(Syscall::Open {
            path: "missing",
            flags: O_RDONLY,
            mode: 0
        }),
        KernelError::NoSuchEntry.into_usize()
    );
    assert_eq!(
        process.syscall(Syscall::Open {
            path: "a",
            flags: 3,
            mode: 0
        }),
        KernelError::InvalidArgument.into_usize()
    );
    assert_eq!(
        process.syscall(Syscall::Close {
            fd: FileDescriptor(0)
        }),
        KernelError::BadFileDescriptor.into_usize()
    );
    assert_eq!(
        KernelError::try_from(KernelError::BadFileDescriptor.into_usize() as isize),
        Ok(KernelError::BadFileDescriptor)
    );

    let fd = process.syscall(Syscall::Open {
        path: "a",
        flags: O_RDWR | O_CREAT,
        mode: 0o644,
    });
    assert_eq!(fd, 0);
    let fd = FileDescriptor(0);
    assert_eq!(process.syscall(Syscall::Write { fd, buf: b"hello" }), 5);
    assert_eq!(process.syscall(Syscall::Tell { fd }), 5);
    assert_eq!(
        process.syscall(Syscall::Seek {
            fd,
            offset: -10,
            whence: 1
        }),
        KernelError::InvalidArgument.into_usize()
    );
    assert_eq!(
        process.syscall(Syscall::Seek {
            fd,
            offset: 1,
            whence: 0
        }),
        1
    );
    assert_eq!(process.syscall(Syscall::Dup { fd }), 1);
    assert_eq!(
        process.syscall(Syscall::Dup2 {
            old: fd,
            new: FileDescriptor(5)
        }),
        5
    );
    let mut buf = [0; 8];
    assert_eq!(
        process.syscall(Syscall::Read {
            fd: FileDescriptor(5),
            buf: &mut buf
        }),
        4
    );
    assert_eq!(&buf[..4], b"ello");
    assert_eq!(process.syscall(Syscall::Tell { fd }), 5);
}

#[test]
fn meld_interleaves_words() {
    let process = process();
    create(&process, "a", b"AAAABBBBCCCC");
    create(&process, "b", b"ddddeeeeffff");

    assert_eq!(
        process.syscall(Syscall::Meld {
            a: "a",
            b: "b",
            out: "out"
        }),
        24
    );
    assert_eq!(read_all(&process, "out"), b"AAAAddddBBBBeeeeCCCCffff");
    assert!(process.file_struct().table().is_empty());
}

#[test]
fn meld_copies_the_longer_tail() {
    let process = process();
    create(&process, "a", b"AAAAB");
    create(&process, "b", b"ddddeeeeffffgg");

    assert_eq!(
        process.syscall(Syscall::Meld {
            a: "a",
            b: "b",
            out: "out"
        }),
        19
    );
    assert_eq!(read_all(&process, "out"), b"AAAAddddBeeeeffffgg");
}

#[test]
fn meld_errors() {
    let process = process();
    create(&process, "a", b"AAAA");
    create(&process, "b", b"dddd");
    create(&process, "out", b"");

    let meld = |a, b, out| process.syscall(Syscall::Meld { a, b, out });
    assert_eq!(meld("a", "missing", "new"), KernelError::NoSuchEntry.into_usize());
    assert_eq!(meld("missing", "b", "new"), KernelError::NoSuchEntry.into_usize());
    assert_eq!(meld("a", "b", "out"), KernelError::FileExist.into_usize());
    // Failed melds close whatever they opened.
    assert!(process.file_struct().table().is_empty());
    assert_eq!(meld("a", "b", "new"), 8);
}

#[test]
fn fork_and_exit() {
    let parent = process();
    create(&parent, "a", b"0123456789");
    let fd = FileDescriptor(parent.syscall(Syscall::Open {
        path: "a",
        flags: O_RDONLY,
        mode: 0,
    }) as i32);

    let child = parent.fork();
    assert_ne!(child.pid(), parent.pid());
    let mut buf = [0; 3];
    assert_eq!(child.syscall(Syscall::Read { fd, buf: &mut buf }), 3);
    assert_eq!(child.exit(7), 7);

    assert_eq!(parent.syscall(Syscall::Tell { fd }), 3);
    assert_eq!(parent.syscall(Syscall::Read { fd, buf: &mut buf }), 3);
    assert_eq!(&buf, b"345");
    assert_eq!(parent.exit(0), 0);
}

#[test]
fn sibling_threads_share_the_table() {
    const THREADS: usize = 4;
    let process = Arc::new(process());
    create(&process, "a", b"");

    let threads = (0..THREADS)
        .map(|i| {
            let process = process.clone();
            ThreadBuilder::new(format!("sibling_{i}")).spawn(move || {
                let fd = process.syscall(Syscall::Open {
                    path: "a",
                    flags: O_RDONLY,
                    mode: 0,
                });
                assert!(fd < THREADS);
            })
        })
        .collect::<Vec<_>>();
    for thread in threads {
        assert_eq!(thread.join(), 0);
    }
    assert_eq!(process.file_struct().table().len(), THREADS);
    for fd in 0..THREADS {
        assert_eq!(
            process.syscall(Syscall::Close {
                fd: FileDescriptor(fd as i32)
            }),
            0
        );
    }
}
