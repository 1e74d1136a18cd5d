use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo<'_>) -> ! {
    error!("{}", info);

    loop {
        core::hint::spin_loop();
    }
}
